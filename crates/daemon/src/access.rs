// Startup permission check against `{prefix}_users.txt` allowlists.
//
// Each allowlist holds one user or host name per line. The first file (by
// file name) listing the current user or host grants access and supplies
// the operator prefix that namespaces every output path.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

const ALLOWLIST_SUFFIX: &str = "_users.txt";

/// Who the tracker is running as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_name: String,
    pub host_name: String,
}

impl Identity {
    pub fn new(user_name: impl Into<String>, host_name: impl Into<String>) -> Self {
        Self { user_name: user_name.into(), host_name: host_name.into() }
    }

    /// Login name and machine name of the current process.
    pub fn current() -> Self {
        let host_name = whoami::fallible::hostname().unwrap_or_else(|_| whoami::devicename());
        Self { user_name: whoami::username(), host_name }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Allowed { prefix: String, allowlist: PathBuf },
    Denied,
}

#[derive(Debug, Clone)]
pub struct AccessGate {
    allowlist_dir: PathBuf,
}

impl AccessGate {
    pub fn new(allowlist_dir: impl Into<PathBuf>) -> Self {
        Self { allowlist_dir: allowlist_dir.into() }
    }

    pub fn check(&self, identity: &Identity) -> Result<AccessDecision> {
        let user = identity.user_name.trim().to_lowercase();
        let host = identity.host_name.trim().to_lowercase();

        for path in self.allowlists()? {
            let contents = match fs::read_to_string(&path) {
                Ok(contents) => contents,
                Err(error) => {
                    warn!(path = %path.display(), error = %error, "skipping unreadable allowlist");
                    continue;
                }
            };

            let listed = contents
                .lines()
                .map(|line| line.trim().trim_start_matches('\u{feff}').to_lowercase())
                .filter(|entry| !entry.is_empty())
                .any(|entry| (!user.is_empty() && entry == user) || (!host.is_empty() && entry == host));
            if !listed {
                continue;
            }

            let Some(prefix) = prefix_of(&path) else {
                continue;
            };
            info!(prefix = %prefix, allowlist = %path.display(), "operator allowed");
            return Ok(AccessDecision::Allowed { prefix, allowlist: path });
        }

        debug!(user = %user, host = %host, "operator not found in any allowlist");
        Ok(AccessDecision::Denied)
    }

    /// Allowlist files in the directory, sorted by file name.
    fn allowlists(&self) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.allowlist_dir).with_context(|| {
            format!("failed to list allowlist directory `{}`", self.allowlist_dir.display())
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && file_name(path).ends_with(ALLOWLIST_SUFFIX))
            .collect();
        paths.sort();
        Ok(paths)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

/// `AR_users.txt` → `AR`; `AR_team_users.txt` → `AR`.
fn prefix_of(path: &Path) -> Option<String> {
    let name = file_name(path);
    let stem = name.strip_suffix(".txt").unwrap_or(&name);
    let prefix = stem.split('_').next().unwrap_or_default();
    (!prefix.is_empty()).then(|| prefix.to_string())
}
