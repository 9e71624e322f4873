// Bounded retry for file writes that can hit a locked target.
//
// A failed attempt waits a fixed backoff on the calling thread and tries
// again, up to `attempts` runs in total. Giving up is reported through
// `WriteOutcome::GaveUp` rather than an error: callers that only care
// about best-effort persistence can ignore it.

use std::io;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total runs of the action, including the first.
    pub attempts: u32,
    /// Fixed wait between runs. No growth, no jitter.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { attempts: 2, backoff: Duration::from_secs(180) }
    }
}

#[derive(Debug)]
pub enum WriteOutcome<T> {
    Written(T),
    GaveUp { attempts: u32, last_error: io::Error },
}

impl<T> WriteOutcome<T> {
    pub fn is_written(&self) -> bool {
        matches!(self, Self::Written(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> WriteOutcome<U> {
        match self {
            Self::Written(value) => WriteOutcome::Written(f(value)),
            Self::GaveUp { attempts, last_error } => WriteOutcome::GaveUp { attempts, last_error },
        }
    }

    pub fn written(self) -> Option<T> {
        match self {
            Self::Written(value) => Some(value),
            Self::GaveUp { .. } => None,
        }
    }
}

/// Whether an I/O failure is worth waiting out.
///
/// Covers locked or busy targets (including Windows sharing and lock
/// violations) and interrupted calls. Everything else fails fast.
pub fn is_transient(error: &io::Error) -> bool {
    #[cfg(windows)]
    {
        const ERROR_SHARING_VIOLATION: i32 = 32;
        const ERROR_LOCK_VIOLATION: i32 = 33;
        if matches!(error.raw_os_error(), Some(ERROR_SHARING_VIOLATION | ERROR_LOCK_VIOLATION)) {
            return true;
        }
        if error.kind() == io::ErrorKind::PermissionDenied {
            return true;
        }
    }

    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock
            | io::ErrorKind::ResourceBusy
            | io::ErrorKind::TimedOut
            | io::ErrorKind::Interrupted
    )
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RetryingFileWriter {
    policy: RetryPolicy,
}

impl RetryingFileWriter {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run `action` until it succeeds, fails permanently, or runs out of
    /// attempts. `target` is only used for logging.
    pub fn run<T, F>(&self, target: &Path, mut action: F) -> WriteOutcome<T>
    where
        F: FnMut() -> io::Result<T>,
    {
        let attempts = self.policy.attempts.max(1);
        let mut attempt = 0u32;
        loop {
            attempt = attempt.saturating_add(1);
            let error = match action() {
                Ok(value) => return WriteOutcome::Written(value),
                Err(error) => error,
            };

            if !is_transient(&error) {
                warn!(path = %target.display(), attempt, error = %error, "write failed permanently");
                return WriteOutcome::GaveUp { attempts: attempt, last_error: error };
            }
            if attempt >= attempts {
                warn!(path = %target.display(), attempt, error = %error, "write gave up after retries");
                return WriteOutcome::GaveUp { attempts: attempt, last_error: error };
            }

            debug!(
                path = %target.display(),
                attempt,
                backoff_ms = self.policy.backoff.as_millis() as u64,
                error = %error,
                "target busy, retrying after backoff"
            );
            std::thread::sleep(self.policy.backoff);
        }
    }
}
