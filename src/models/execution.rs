//! Outcome of executing one plan

use serde::{Deserialize, Serialize};

/// One row per file recording what execute actually did
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub file_id: i64,
    pub started_at: i64,
    pub completed_at: i64,
    /// Bytes copied; -1 is the reporter sentinel for "already done, skipped"
    pub bytes_written: i64,
    pub verify_ok: bool,
    pub error: Option<String>,
}
