// Tracker configuration.
//
// Global config: `~/.deltrack/config.toml`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::store::retry::RetryPolicy;

const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 60;
const DEFAULT_RETRY_ATTEMPTS: u32 = 2;
const DEFAULT_RETRY_BACKOFF_SECS: u64 = 180;

/// Root directory for tracker state: `~/.deltrack/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".deltrack"))
}

/// Path to the config file: `~/.deltrack/config.toml`.
pub fn global_config_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("config.toml"))
}

fn default_shared_root() -> PathBuf {
    global_dir().unwrap_or_else(|| PathBuf::from(".deltrack")).join("DeleteLog")
}

// ── Tracker config ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrackerConfig {
    /// Folder holding one `{project}_{prefix}` subfolder per tracked project.
    pub shared_root: PathBuf,
    /// Folder holding the `{prefix}_users.txt` allowlists (defaults to
    /// `shared_root`).
    pub allowlist_dir: Option<PathBuf>,
    pub flush: FlushConfig,
    pub retry: RetryConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            shared_root: default_shared_root(),
            allowlist_dir: None,
            flush: FlushConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl TrackerConfig {
    /// Load from `~/.deltrack/config.toml`. Returns defaults if the file
    /// doesn't exist or can't be parsed.
    pub fn load() -> Self {
        global_config_path().and_then(|p| Self::load_from(&p).ok()).unwrap_or_default()
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, contents).map_err(ConfigError::Io)
    }

    pub fn allowlist_dir(&self) -> &Path {
        self.allowlist_dir.as_deref().unwrap_or(&self.shared_root)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush.interval_secs.max(1))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry.attempts.max(1),
            backoff: Duration::from_secs(self.retry.backoff_secs),
        }
    }
}

/// Periodic flush settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FlushConfig {
    /// Seconds between dirty checks.
    pub interval_secs: u64,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self { interval_secs: DEFAULT_FLUSH_INTERVAL_SECS }
    }
}

/// Retry settings for every file write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per write, including the first.
    pub attempts: u32,
    /// Fixed wait between attempts.
    pub backoff_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { attempts: DEFAULT_RETRY_ATTEMPTS, backoff_secs: DEFAULT_RETRY_BACKOFF_SECS }
    }
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Parse(e) => write!(f, "config parse error: {e}"),
            Self::Serialize(e) => write!(f, "config serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_documented_timings() {
        let cfg = TrackerConfig::default();
        assert_eq!(cfg.flush_interval(), Duration::from_secs(60));
        assert_eq!(cfg.retry_policy().attempts, 2);
        assert_eq!(cfg.retry_policy().backoff, Duration::from_secs(180));
        assert!(cfg.shared_root.ends_with("DeleteLog"));
    }

    #[test]
    fn allowlist_dir_falls_back_to_shared_root() {
        let mut cfg = TrackerConfig::default();
        cfg.shared_root = PathBuf::from("/share/DeleteLog");
        assert_eq!(cfg.allowlist_dir(), Path::new("/share/DeleteLog"));

        cfg.allowlist_dir = Some(PathBuf::from("/share/users"));
        assert_eq!(cfg.allowlist_dir(), Path::new("/share/users"));
    }

    #[test]
    fn parse_partial_toml_uses_defaults() {
        let toml_str = r#"
shared_root = "/share/DeleteLog"

[retry]
backoff_secs = 5
"#;
        let cfg: TrackerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.shared_root, PathBuf::from("/share/DeleteLog"));
        assert_eq!(cfg.retry.backoff_secs, 5);
        assert_eq!(cfg.retry.attempts, 2); // default
        assert_eq!(cfg.flush.interval_secs, 60); // default
    }

    #[test]
    fn zero_attempts_still_runs_once() {
        let mut cfg = TrackerConfig::default();
        cfg.retry.attempts = 0;
        assert_eq!(cfg.retry_policy().attempts, 1);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let cfg = TrackerConfig {
            shared_root: dir.path().join("share"),
            allowlist_dir: Some(dir.path().join("users")),
            flush: FlushConfig { interval_secs: 15 },
            retry: RetryConfig { attempts: 3, backoff_secs: 1 },
        };
        cfg.save_to(&path).unwrap();
        assert_eq!(TrackerConfig::load_from(&path).unwrap(), cfg);
    }

    #[test]
    fn load_missing_file_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        let result = TrackerConfig::load_from(&dir.path().join("missing.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
