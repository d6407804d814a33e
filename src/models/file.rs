//! Source file record - the unit of work for every stage

use serde::{Deserialize, Serialize};

use super::FileStatus;

/// A discovered source file and its pipeline state
///
/// Inserted by scan; later stages only touch `status`, `last_error`
/// and `sha1`. The `file_key` is the stable identity of the source
/// file (its absolute path), so repeated scans refresh rather than
/// duplicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: i64,
    pub file_key: String,
    pub src_path: String,
    pub size_bytes: i64,
    pub mtime_unix: i64,
    pub sha1: Option<String>,
    pub status: FileStatus,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub last_update_at: i64,
}

impl FileRecord {
    /// Build a fresh record for a file seen by the scanner
    pub fn discovered(src_path: String, size_bytes: i64, mtime_unix: i64, now: i64) -> Self {
        Self {
            id: 0,
            file_key: src_path.clone(),
            src_path,
            size_bytes,
            mtime_unix,
            sha1: None,
            status: FileStatus::Discovered,
            last_error: None,
            created_at: now,
            last_update_at: now,
        }
    }
}
