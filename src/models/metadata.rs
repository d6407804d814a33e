//! Merged technical and tag metadata for one file

use serde::{Deserialize, Serialize};

/// One row per file: probe output merged with tag-reader output
///
/// Text tag fields use the empty string for "unset" and numeric tag
/// fields use zero, so "non-empty"/"positive" checks read naturally
/// in enrichment and scoring.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackMeta {
    pub file_id: i64,

    // audio properties (probe is authoritative)
    pub format: String,
    pub codec: String,
    pub container: String,
    pub duration_ms: i64,
    pub sample_rate: i32,
    pub bit_depth: i32,
    pub channels: i32,
    pub bitrate_kbps: i32,
    pub lossless: bool,

    // tag fields (tag reader overlays probe)
    pub tag_artist: String,
    pub tag_album: String,
    pub tag_title: String,
    pub tag_albumartist: String,
    pub tag_date: String,
    pub tag_track: i32,
    pub tag_track_total: i32,
    pub tag_disc: i32,
    pub tag_disc_total: i32,
    pub tag_compilation: bool,

    /// Optional external recording/release identifier
    pub external_id: Option<String>,
    /// Raw tag map kept verbatim for audit
    pub raw_tags: serde_json::Value,
}

impl TrackMeta {
    pub fn new(file_id: i64) -> Self {
        Self {
            file_id,
            raw_tags: serde_json::Value::Null,
            ..Default::default()
        }
    }

    /// True when artist, album, title and a positive track number are all set
    pub fn tags_complete(&self) -> bool {
        !self.tag_artist.is_empty()
            && !self.tag_album.is_empty()
            && !self.tag_title.is_empty()
            && self.tag_track > 0
    }
}
