//! Planned filesystem action for one file

use serde::{Deserialize, Serialize};

use super::PlanAction;

/// One row per file: what to do with it and where it lands
///
/// Skip plans have an empty `dest_path`; after collision resolution
/// destination paths are unique across all non-skip plans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub file_id: i64,
    pub action: PlanAction,
    pub dest_path: String,
    /// Human string: winner score, duplicate-of, or collision cause
    pub reason: String,
    pub created_at: i64,
}
