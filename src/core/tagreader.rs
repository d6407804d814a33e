//! Tag extraction over raw file bytes using lofty
//!
//! Decodes ID3v2, MP4 atoms, Vorbis Comments and APE tags. This side
//! of the merge supplies tag fields only; audio properties come from
//! the probe, which is authoritative for them.

use std::path::Path;

use lofty::{Accessor, ItemKey, ItemValue, Probe, TaggedFileExt};

use crate::error::SweepError;

/// Tag fields read from the file's own metadata blocks
#[derive(Debug, Clone, Default)]
pub struct TagData {
    pub artist: String,
    pub album: String,
    pub title: String,
    pub albumartist: String,
    pub date: String,
    pub genre: String,
    pub track: i32,
    pub track_total: i32,
    pub disc: i32,
    pub disc_total: i32,
    pub compilation: Option<bool>,
    /// Every tag item verbatim, for the audit blob
    pub raw: serde_json::Value,
}

/// Per-format compilation flag keys, normalized to a boolean
const COMPILATION_KEYS: &[&str] = &["TCMP", "cpil", "COMPILATION"];

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "y"
    )
}

/// Read tags from a file; fails when no tag block can be decoded
pub fn read_tags(path: &Path) -> Result<TagData, SweepError> {
    let tagged_file = Probe::open(path)
        .map_err(|e| SweepError::DecodeFailed(format!("failed to open {}: {}", path.display(), e)))?
        .read()
        .map_err(|e| SweepError::DecodeFailed(format!("failed to read tags: {}", e)))?;

    let tag = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag())
        .ok_or_else(|| SweepError::DecodeFailed("no tag block present".to_string()))?;

    let mut data = TagData {
        artist: tag.artist().map(|s| s.to_string()).unwrap_or_default(),
        album: tag.album().map(|s| s.to_string()).unwrap_or_default(),
        title: tag.title().map(|s| s.to_string()).unwrap_or_default(),
        genre: tag.genre().map(|s| s.to_string()).unwrap_or_default(),
        albumartist: tag
            .get_string(&ItemKey::AlbumArtist)
            .map(|s| s.to_string())
            .unwrap_or_default(),
        track: tag.track().map(|n| n as i32).unwrap_or(0),
        track_total: tag.track_total().map(|n| n as i32).unwrap_or(0),
        disc: tag.disk().map(|n| n as i32).unwrap_or(0),
        disc_total: tag.disk_total().map(|n| n as i32).unwrap_or(0),
        ..Default::default()
    };

    // full date strings like "2025-01-15" live under the date keys;
    // the year() accessor alone drops the month/day
    let date_keys = [
        ItemKey::RecordingDate,
        ItemKey::OriginalReleaseDate,
        ItemKey::Year,
    ];
    for key in date_keys {
        if let Some(date) = tag.get_string(&key) {
            if !date.trim().is_empty() {
                data.date = date.trim().to_string();
                break;
            }
        }
    }
    if data.date.is_empty() {
        if let Some(year) = tag.year() {
            data.date = year.to_string();
        }
    }

    // compilation flag: TCMP (id3), cpil (mp4), COMPILATION (vorbis/ape)
    if let Some(flag) = tag.get_string(&ItemKey::FlagCompilation) {
        data.compilation = Some(parse_flag(flag));
    } else {
        for key in COMPILATION_KEYS {
            if let Some(flag) = tag.get_string(&ItemKey::Unknown(key.to_string())) {
                data.compilation = Some(parse_flag(flag));
                break;
            }
        }
    }

    // raw tag map for audit
    let mut raw = serde_json::Map::new();
    for item in tag.items() {
        let key = match item.key() {
            ItemKey::Unknown(k) => k.clone(),
            known => format!("{:?}", known),
        };
        let value = match item.value() {
            ItemValue::Text(s) | ItemValue::Locator(s) => serde_json::Value::String(s.clone()),
            ItemValue::Binary(b) => serde_json::Value::String(format!("<{} binary bytes>", b.len())),
        };
        raw.insert(key, value);
    }
    data.raw = serde_json::Value::Object(raw);

    Ok(data)
}
