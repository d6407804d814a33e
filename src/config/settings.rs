//! Run settings for TuneSweep
//!
//! All knobs come in from the CLI and are threaded through the stages
//! by value. There is no process-wide config singleton: every stage
//! receives the settings (and the store handle) it needs explicitly.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::models::{PlanAction, VerifyMode};
use crate::utils::retry::RetryPolicy;

/// Extensions the tag writer knows how to stamp in-place
pub const TAG_WRITABLE_EXTENSIONS: &[&str] = &["mp3", "flac", "m4a", "ogg", "opus"];

/// Audio extensions considered by the scanner unless overridden
pub fn default_extensions() -> HashSet<String> {
    [
        "mp3", "flac", "m4a", "ogg", "opus", "wav", "aiff", "ape", "wv", "tta", "mpc", "wma",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Settings for one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Source tree root (read-only)
    pub src_root: PathBuf,

    /// Destination tree root
    pub dest_root: PathBuf,

    /// State store path
    pub db_path: PathBuf,

    /// Materialization mode for cluster winners
    pub mode: PlanAction,

    /// Worker pool size per stage
    pub concurrency: usize,

    /// Post-action verification policy
    pub verify: VerifyMode,

    /// Iterate plans without touching the filesystem
    pub dry_run: bool,

    /// Stamp enriched tags onto copied/moved outputs
    pub write_tags: bool,

    /// Copy chunk size in bytes
    pub buffer_size: usize,

    /// Retry policy for transient destination I/O
    pub retry: RetryPolicy,

    /// Lowercased audio extensions accepted by scan
    pub extensions: HashSet<String>,

    /// Follow symlinks while scanning
    pub follow_symlinks: bool,

    /// Fill empty artist/album/albumartist from directory siblings
    pub sibling_enrichment: bool,

    /// Relaxed fsync + large cache for stores on network filesystems
    pub network_optimized: bool,

    /// Base URL of the optional canonical artist name service
    pub canonical_url: Option<String>,

    /// JSON-lines event log path
    pub events_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            src_root: PathBuf::new(),
            dest_root: PathBuf::new(),
            db_path: PathBuf::from("tunesweep.db"),
            mode: PlanAction::Copy,
            concurrency: 4,
            verify: VerifyMode::Size,
            dry_run: false,
            write_tags: false,
            buffer_size: 128 * 1024,
            retry: RetryPolicy::default(),
            extensions: default_extensions(),
            follow_symlinks: true,
            sibling_enrichment: true,
            network_optimized: false,
            canonical_url: None,
            events_path: None,
        }
    }
}

impl Settings {
    /// True when the extension (lowercased, no dot) is in the audio set
    pub fn is_audio_extension(&self, ext: &str) -> bool {
        self.extensions.contains(&ext.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_extensions() {
        let settings = Settings::default();
        assert!(settings.is_audio_extension("mp3"));
        assert!(settings.is_audio_extension("FLAC"));
        assert!(!settings.is_audio_extension("txt"));
    }
}
