//! Cluster of files believed to be the same recording

use serde::{Deserialize, Serialize};

/// A group of files sharing one fingerprint key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    /// Pipe-delimited fingerprint: artist|title|version|bucket|disc
    pub cluster_key: String,
    /// Human-readable "artist - title" hint for reports
    pub hint: String,
    pub created_at: i64,
}

/// Membership of one file in one cluster
///
/// `quality_score` is written only by scoring, `preferred` only by
/// winner selection; exactly one member per cluster ends up preferred.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterMember {
    pub cluster_key: String,
    pub file_id: i64,
    pub quality_score: f64,
    pub preferred: bool,
}
