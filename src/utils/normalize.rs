//! Text normalization for cluster fingerprints

use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::models::VersionType;

lazy_static! {
    // bracketed segments: (live), [remaster], {x}
    static ref BRACKETED: Regex = Regex::new(r"[\(\[\{][^\)\]\}]*[\)\]\}]").unwrap();

    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();

    static ref LIVE: Regex = Regex::new(r"(?i)\b(live|unplugged)\b").unwrap();
    static ref ACOUSTIC: Regex = Regex::new(r"(?i)\bacoustic\b").unwrap();
    static ref REMIX: Regex = Regex::new(r"(?i)\b(remix|remixed|rmx)\b").unwrap();
    static ref DEMO: Regex = Regex::new(r"(?i)\b(demo|rough mix)\b").unwrap();
    static ref INSTRUMENTAL: Regex = Regex::new(r"(?i)\b(instrumental|karaoke)\b").unwrap();
}

/// Canonical text form used inside cluster keys
///
/// Lowercased, NFC-composed, `&`/`/`/`+` mapped to "and", bracketed
/// segments dropped, remaining punctuation stripped, whitespace
/// collapsed. Unicode letters survive: "Björk" stays "björk".
pub fn normalize_text(input: &str) -> String {
    let composed: String = input.nfc().collect();
    let lowered = composed.to_lowercase();

    let without_brackets = BRACKETED.replace_all(&lowered, " ");

    let mut mapped = String::with_capacity(without_brackets.len());
    for c in without_brackets.chars() {
        match c {
            '&' | '/' | '+' => mapped.push_str(" and "),
            c if c.is_alphanumeric() || c.is_whitespace() => mapped.push(c),
            _ => mapped.push(' '),
        }
    }

    WHITESPACE.replace_all(mapped.trim(), " ").to_string()
}

/// Normalized artist; an empty artist becomes "unknown"
pub fn norm_artist(artist: &str) -> String {
    let normalized = normalize_text(artist);
    if normalized.is_empty() {
        "unknown".to_string()
    } else {
        normalized
    }
}

/// Normalized title with filename fallbacks
///
/// An empty title falls back to the source filename stem (dots
/// removed); when even that normalizes to nothing, the parent
/// directory names the file: `file_<parent>`.
pub fn norm_title(title: &str, src_path: &Path) -> String {
    let normalized = normalize_text(title);
    if !normalized.is_empty() {
        return normalized;
    }

    let stem = src_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .replace('.', "");
    let from_stem = normalize_text(&stem);
    if !from_stem.is_empty() {
        return from_stem;
    }

    let parent = src_path
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .map(normalize_text)
        .unwrap_or_default();

    if parent.is_empty() {
        "file_unknown".to_string()
    } else {
        format!("file_{}", parent)
    }
}

/// Detect the recording version from the original (un-stripped) title
///
/// Precedence when several keywords match:
/// live > acoustic > remix > demo > instrumental > studio.
/// Remaster/deluxe/anniversary/bonus wording stays studio.
pub fn detect_version_type(title: &str) -> VersionType {
    if LIVE.is_match(title) {
        VersionType::Live
    } else if ACOUSTIC.is_match(title) {
        VersionType::Acoustic
    } else if REMIX.is_match(title) {
        VersionType::Remix
    } else if DEMO.is_match(title) {
        VersionType::Demo
    } else if INSTRUMENTAL.is_match(title) {
        VersionType::Instrumental
    } else {
        VersionType::Studio
    }
}

/// 3-second duration bucket used in the cluster key
///
/// Wide enough to absorb decoder drift between rips of the same
/// recording; missing or negative durations land in bucket 0.
pub fn duration_bucket(duration_ms: i64) -> i64 {
    if duration_ms <= 0 {
        return 0;
    }
    ((duration_ms as f64 / 3000.0).round() as i64) * 3
}
