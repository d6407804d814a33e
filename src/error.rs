//! Error kinds shared across the pipeline
//!
//! Per-file failures are recorded as text on the file row and the
//! stage moves on; only setup failures (cannot open the store,
//! destination unwritable) abort a stage.

use std::path::PathBuf;

/// Errors a stage can hit while processing a single file
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    #[error("unreadable: {0}: {1}")]
    Unreadable(PathBuf, String),

    #[error("tag decode failed: {0}")]
    DecodeFailed(String),

    #[error("probe failed: {0}")]
    ProbeFailed(String),

    #[error("transient i/o error: {0}")]
    Transient(#[source] std::io::Error),

    #[error("verification failed: {0}")]
    VerificationFailed(String),

    #[error("destination collision: {0}")]
    Collision(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("canceled")]
    Canceled,
}

impl SweepError {
    /// Classify an io::Error hit while touching the given path
    pub fn from_io(path: &std::path::Path, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => SweepError::PathNotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => {
                SweepError::PermissionDenied(path.to_path_buf())
            }
            _ => SweepError::Transient(err),
        }
    }

    /// Whether retrying the operation could help
    pub fn is_retryable(&self) -> bool {
        matches!(self, SweepError::Transient(_))
    }
}
