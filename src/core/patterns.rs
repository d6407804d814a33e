//! Pattern cleaning for scraped and scene-ripped tag values
//!
//! Messy libraries carry release-group suffixes, catalog numbers and
//! tracker attributions inside album tags. Cleaning runs after
//! enrichment, per field, and is conservative: when a cleaned album
//! would end up empty or look like a URL dump, the original value is
//! kept.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // release markers that only ever appear as album suffixes
    static ref SUFFIX_MARKERS: Vec<Regex> = [
        r"(?i)\s*[-_]\s*WEB$", r"(?i)\s+WEB$", r"(?i)\s*\(WEB\)$", r"(?i)\s*\[WEB\]$",
        r"(?i)\s*[-_]\s*VINYL$", r"(?i)\s+VINYL$", r"(?i)\s*\(VINYL\)$", r"(?i)\s*\[VINYL\]$",
        r"(?i)\s*[-_]\s*CD$", r"(?i)\s*\(CD\)$", r"(?i)\s*\[CD\]$",
        r"(?i)\s*[-_]\s*EP$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect();

    // bracketed catalog numbers: [CAT12345], (OVM049)
    static ref CATALOG: Regex = Regex::new(r"[\[\(][A-Z0-9]{3,15}[\]\)]").unwrap();

    // bracketed attributions: [www.site.com], [by someone], [http...]
    static ref ATTRIBUTION: Regex =
        Regex::new(r"(?i)\[(?:www|by\s|http)[^\]]*\]").unwrap();

    static ref BOOTLEG: Regex =
        Regex::new(r"(?i)\s*[\(\[]?\b(bootleg|promo)\b[\)\]]?").unwrap();

    static ref URL_BASED: Regex =
        Regex::new(r"(?i)(soundcloud|facebook|myspace|blogspot|djsoundtop|^http|www_)").unwrap();

    static ref FEAT: Regex =
        Regex::new(r"(?i)[\(\[]?\s*(?:feat\.?|ft\.?|featuring)\s+([^\)\]]+?)\s*[\)\]]?$").unwrap();

    static ref MULTI_DASH: Regex = Regex::new(r"-{2,}").unwrap();
    static ref MULTI_UNDERSCORE: Regex = Regex::new(r"_{2,}").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Compilation wording checked against the lowercased path and album
const COMPILATION_MARKERS: &[&str] = &[
    "various artists",
    "compilation",
    "mixed by",
    "compiled by",
    "_singles",
];

/// Strip release-scene debris from an album name
///
/// Keeps the original when the cleaned result is empty or URL-based.
pub fn clean_album(album: &str) -> String {
    if album.is_empty() {
        return String::new();
    }

    let mut result = album.to_string();

    // suffix markers can stack ("Album (WEB) [FLAC] -VINYL"), so loop
    loop {
        let before = result.clone();
        for marker in SUFFIX_MARKERS.iter() {
            result = marker.replace(&result, "").to_string();
        }
        result = result.trim().to_string();
        if result == before {
            break;
        }
    }

    result = CATALOG.replace_all(&result, " ").to_string();
    result = ATTRIBUTION.replace_all(&result, " ").to_string();

    if BOOTLEG.is_match(&result) {
        tracing::warn!("album '{}' carries a bootleg/promo marker", album);
        result = BOOTLEG.replace_all(&result, " ").to_string();
    }

    result = MULTI_DASH.replace_all(&result, "-").to_string();
    result = MULTI_UNDERSCORE.replace_all(&result, "_").to_string();
    result = WHITESPACE.replace_all(result.trim(), " ").to_string();

    if result.is_empty() || URL_BASED.is_match(&result) {
        return album.to_string();
    }

    result
}

/// Placeholder artists count as empty so later stages may re-enrich
pub fn clean_artist(artist: &str) -> String {
    if artist.trim().eq_ignore_ascii_case("unknown artist") {
        return String::new();
    }
    artist.trim().to_string()
}

/// Extract a featured-artist guest from a title, if any
///
/// The title itself is never modified; callers only warn.
pub fn featured_guest(title: &str) -> Option<String> {
    FEAT.captures(title)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// True when the path or album carries compilation wording
pub fn has_compilation_marker(path: &str, album: &str) -> bool {
    let path_lower = path.to_lowercase();
    let album_lower = album.to_lowercase();

    COMPILATION_MARKERS
        .iter()
        .any(|m| path_lower.contains(m) || album_lower.contains(m))
}
