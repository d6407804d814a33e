//! Retry policy for transient destination I/O
//!
//! Wraps the filesystem calls the executor makes around the
//! destination tree. Only errors classified as transient are retried;
//! not-found and permission errors fail immediately.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SweepError;

/// Capped exponential backoff policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_wait: Duration,
    pub max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        // a single attempt: retries are opt-in via --retry-max
        Self {
            max_attempts: 1,
            initial_wait: Duration::from_millis(100),
            max_wait: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Default::default()
        }
    }

    /// Wait before the given retry attempt (1-based)
    fn wait_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_wait
            .saturating_mul(factor)
            .min(self.max_wait)
    }
}

/// Run `op`, retrying transient failures per the policy
///
/// Runs on a blocking thread; the waits are thread sleeps.
pub fn with_retry<T, F>(policy: &RetryPolicy, mut op: F) -> Result<T, SweepError>
where
    F: FnMut() -> Result<T, SweepError>,
{
    let mut attempt = 1;

    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                let wait = policy.wait_for_attempt(attempt);
                tracing::debug!("transient error (attempt {}): {}; retrying in {:?}", attempt, err, wait);
                std::thread::sleep(wait);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// `fs::File::open` with retry on transient errors
pub fn open_with_retry(policy: &RetryPolicy, path: &Path) -> Result<fs::File, SweepError> {
    with_retry(policy, || {
        fs::File::open(path).map_err(|e| SweepError::from_io(path, e))
    })
}

/// `fs::File::create` with retry on transient errors
pub fn create_with_retry(policy: &RetryPolicy, path: &Path) -> Result<fs::File, SweepError> {
    with_retry(policy, || {
        fs::File::create(path).map_err(|e| SweepError::from_io(path, e))
    })
}

/// `fs::create_dir_all` with retry on transient errors
pub fn mkdir_all_with_retry(policy: &RetryPolicy, path: &Path) -> Result<(), SweepError> {
    with_retry(policy, || {
        fs::create_dir_all(path).map_err(|e| SweepError::from_io(path, e))
    })
}

/// `fs::rename` with retry on transient errors
pub fn rename_with_retry(policy: &RetryPolicy, from: &Path, to: &Path) -> Result<(), SweepError> {
    with_retry(policy, || {
        fs::rename(from, to).map_err(|e| SweepError::from_io(from, e))
    })
}

/// `fs::metadata` with retry on transient errors
pub fn stat_with_retry(policy: &RetryPolicy, path: &Path) -> Result<fs::Metadata, SweepError> {
    with_retry(policy, || {
        fs::metadata(path).map_err(|e| SweepError::from_io(path, e))
    })
}

/// `fs::remove_file` with retry on transient errors
pub fn remove_with_retry(policy: &RetryPolicy, path: &Path) -> Result<(), SweepError> {
    with_retry(policy, || {
        fs::remove_file(path).map_err(|e| SweepError::from_io(path, e))
    })
}
