//! Filename and directory enrichment for sparse tags
//!
//! Many rips carry everything in the filename and nothing in the tag
//! block. Enrichment parses the basename against a pattern ladder with
//! confidence scores and mines the directory structure, but only ever
//! fills fields that are still empty: a tag value always wins over a
//! filename guess.

use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;

use crate::models::TrackMeta;

lazy_static! {
    // "01 - Artist - Title"
    static ref NUM_ARTIST_TITLE: Regex =
        Regex::new(r"^(\d{1,3})\s*-\s*(.+?)\s*-\s*(.+)$").unwrap();

    // "01 - Title"
    static ref NUM_TITLE: Regex = Regex::new(r"^(\d{1,3})\s*-\s*(.+)$").unwrap();

    // "01.Title" / "01_Title"
    static ref NUM_SEP_TITLE: Regex = Regex::new(r"^(\d{1,3})[._]\s*(.+)$").unwrap();

    // "Artist - Title"
    static ref ARTIST_TITLE: Regex = Regex::new(r"^(.+?)\s*-\s*(.+)$").unwrap();

    // album folders: "2005 - Helen Savage" / "Helen Savage (2005)"
    static ref YEAR_PREFIX: Regex = Regex::new(r"^(\d{4})\s*-\s*(.+)$").unwrap();
    static ref YEAR_SUFFIX: Regex = Regex::new(r"^(.+?)\s*\((\d{4})\)$").unwrap();

    // disc folders: "CD1", "Disc 2", "disk 03"
    static ref DISC_FOLDER: Regex = Regex::new(r"(?i)^(?:CD|Disc|Disk)\s*(\d+)$").unwrap();
}

/// What the filename alone tells us, and how sure we are
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilenameGuess {
    pub track: Option<i32>,
    pub artist: Option<String>,
    pub title: Option<String>,
    pub confidence: f64,
}

/// Parse a filename stem against the pattern ladder
pub fn parse_stem(stem: &str) -> FilenameGuess {
    let mut guess = if let Some(cap) = NUM_ARTIST_TITLE.captures(stem) {
        FilenameGuess {
            track: cap[1].parse().ok(),
            artist: Some(cap[2].trim().to_string()),
            title: Some(cap[3].trim().to_string()),
            confidence: 0.8,
        }
    } else if let Some(cap) = NUM_TITLE.captures(stem) {
        FilenameGuess {
            track: cap[1].parse().ok(),
            artist: None,
            title: Some(cap[2].trim().to_string()),
            confidence: 0.7,
        }
    } else if let Some(cap) = NUM_SEP_TITLE.captures(stem) {
        FilenameGuess {
            track: cap[1].parse().ok(),
            artist: None,
            title: Some(cap[2].trim().to_string()),
            confidence: 0.6,
        }
    } else if let Some(cap) = ARTIST_TITLE.captures(stem) {
        FilenameGuess {
            track: None,
            artist: Some(cap[1].trim().to_string()),
            title: Some(cap[2].trim().to_string()),
            confidence: 0.5,
        }
    } else {
        // safety net: the raw stem as title
        FilenameGuess {
            track: None,
            artist: None,
            title: Some(stem.trim().to_string()).filter(|s| !s.is_empty()),
            confidence: 0.2,
        }
    };

    if guess.track.is_some() {
        guess.confidence += 0.15;
    }
    if stem.contains(" - ") || stem.contains(" _ ") {
        guess.confidence += 0.05;
    }
    guess.confidence = guess.confidence.min(1.0);

    guess
}

/// Fill still-empty fields from the filename
pub fn enrich_from_filename(meta: &mut TrackMeta, src_path: &Path) {
    let stem = match src_path.file_stem().and_then(|s| s.to_str()) {
        Some(stem) => stem,
        None => return,
    };

    let guess = parse_stem(stem);

    if meta.tag_artist.is_empty() && guess.confidence >= 0.5 {
        if let Some(artist) = &guess.artist {
            meta.tag_artist = artist.clone();
        }
    }
    if meta.tag_title.is_empty() && guess.confidence >= 0.3 {
        if let Some(title) = &guess.title {
            meta.tag_title = title.clone();
        }
    }
    if meta.tag_track == 0 {
        if let Some(track) = guess.track {
            meta.tag_track = track;
        }
    }
}

/// Fill still-empty fields from the directory structure
///
/// Layout assumption: `<root>/Artist/Album/track` with an optional
/// disc folder (`CD 2`) between album and track. Directories at or
/// above the scan root are never used - a file sitting directly under
/// the root gets no artist from the root's own name.
pub fn enrich_from_path(meta: &mut TrackMeta, src_path: &Path, src_root: &Path) {
    let below_root = |p: &Path| p.starts_with(src_root) && p != src_root;

    let mut album_dir = src_path.parent();

    // a disc folder names the disc, and shifts album/artist one up
    if let Some(dir) = album_dir {
        if let Some(name) = dir.file_name().and_then(|n| n.to_str()) {
            if let Some(cap) = DISC_FOLDER.captures(name) {
                if meta.tag_disc == 0 {
                    if let Ok(disc) = cap[1].parse() {
                        meta.tag_disc = disc;
                    }
                }
                album_dir = dir.parent();
            }
        }
    }

    let artist_dir = album_dir.and_then(|d| d.parent());

    if let Some(dir) = album_dir.filter(|d| below_root(d)) {
        if let Some(name) = dir.file_name().and_then(|n| n.to_str()) {
            let (album_name, year) = split_album_folder(name);

            if meta.tag_album.is_empty() && !album_name.is_empty() {
                meta.tag_album = album_name;
            }
            if meta.tag_date.is_empty() {
                if let Some(year) = year {
                    meta.tag_date = year;
                }
            }
        }
    }

    if meta.tag_artist.is_empty() {
        if let Some(dir) = artist_dir.filter(|d| below_root(d)) {
            if let Some(name) = dir.file_name().and_then(|n| n.to_str()) {
                if !name.is_empty() {
                    meta.tag_artist = name.to_string();
                }
            }
        }
    }
}

/// Split an album folder name into (album, year) per the common
/// "YYYY - Name" and "Name (YYYY)" layouts
fn split_album_folder(name: &str) -> (String, Option<String>) {
    if let Some(cap) = YEAR_PREFIX.captures(name) {
        if let Ok(year) = cap[1].parse::<i32>() {
            if (1900..=2099).contains(&year) {
                return (cap[2].trim().to_string(), Some(cap[1].to_string()));
            }
        }
    }

    if let Some(cap) = YEAR_SUFFIX.captures(name) {
        if let Ok(year) = cap[2].parse::<i32>() {
            if (1900..=2099).contains(&year) {
                return (cap[1].trim().to_string(), Some(cap[2].to_string()));
            }
        }
    }

    (name.trim().to_string(), None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stem_ladder() {
        let g = parse_stem("01 - Miles Davis - So What");
        assert_eq!(g.track, Some(1));
        assert_eq!(g.artist.as_deref(), Some("Miles Davis"));
        assert_eq!(g.title.as_deref(), Some("So What"));
        // 0.8 base + 0.15 track + 0.05 separator
        assert!((g.confidence - 1.0).abs() < 1e-9);

        let g = parse_stem("07 - Blue in Green");
        assert_eq!(g.track, Some(7));
        assert_eq!(g.artist, None);
        assert_eq!(g.title.as_deref(), Some("Blue in Green"));
        assert!((g.confidence - 0.9).abs() < 1e-9);

        let g = parse_stem("03.Freddie Freeloader");
        assert_eq!(g.track, Some(3));
        assert!((g.confidence - 0.75).abs() < 1e-9);

        let g = parse_stem("Miles Davis - All Blues");
        assert_eq!(g.track, None);
        assert_eq!(g.artist.as_deref(), Some("Miles Davis"));
        assert!((g.confidence - 0.55).abs() < 1e-9);

        let g = parse_stem("random recording");
        assert_eq!(g.artist, None);
        assert_eq!(g.title.as_deref(), Some("random recording"));
        assert!((g.confidence - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_enrich_scenario_year_folder() {
        // empty tags + "/music/Artist/2005 - Helen Savage/01 - Helen Savage (Original Mix).mp3"
        let path = Path::new("/music/Artist/2005 - Helen Savage/01 - Helen Savage (Original Mix).mp3");
        let root = Path::new("/music");

        let mut meta = TrackMeta::new(1);
        enrich_from_filename(&mut meta, path);
        enrich_from_path(&mut meta, path, root);

        assert_eq!(meta.tag_artist, "Artist");
        assert_eq!(meta.tag_album, "Helen Savage");
        assert_eq!(meta.tag_date, "2005");
        assert_eq!(meta.tag_track, 1);
        assert_eq!(meta.tag_title, "Helen Savage (Original Mix)");
    }

    #[test]
    fn test_enrich_never_overwrites_tags() {
        let path = Path::new("/music/Wrong Artist/Wrong Album/02 - Wrong Title.mp3");
        let root = Path::new("/music");

        let mut meta = TrackMeta::new(1);
        meta.tag_artist = "Real Artist".to_string();
        meta.tag_title = "Real Title".to_string();
        meta.tag_track = 9;

        enrich_from_filename(&mut meta, path);
        enrich_from_path(&mut meta, path, root);

        assert_eq!(meta.tag_artist, "Real Artist");
        assert_eq!(meta.tag_title, "Real Title");
        assert_eq!(meta.tag_track, 9);
        // album was empty, the folder fills it
        assert_eq!(meta.tag_album, "Wrong Album");
    }

    #[test]
    fn test_enrich_disc_folder_shifts_album() {
        let path = Path::new("/music/Band/Big Album/CD 2/04 - Song.flac");
        let root = Path::new("/music");

        let mut meta = TrackMeta::new(1);
        enrich_from_filename(&mut meta, path);
        enrich_from_path(&mut meta, path, root);

        assert_eq!(meta.tag_disc, 2);
        assert_eq!(meta.tag_album, "Big Album");
        assert_eq!(meta.tag_artist, "Band");
    }

    #[test]
    fn test_enrich_album_year_suffix() {
        let path = Path::new("/music/Band/Quiet Nights (1963)/05 - Corcovado.mp3");
        let root = Path::new("/music");

        let mut meta = TrackMeta::new(1);
        enrich_from_path(&mut meta, path, root);

        assert_eq!(meta.tag_album, "Quiet Nights");
        assert_eq!(meta.tag_date, "1963");
    }

    #[test]
    fn test_enrich_file_directly_under_root() {
        // nothing usable above the file; artist and album stay empty
        let path = Path::new("/src/unknown.mp3");
        let root = Path::new("/src");

        let mut meta = TrackMeta::new(1);
        enrich_from_filename(&mut meta, path);
        enrich_from_path(&mut meta, path, root);

        assert_eq!(meta.tag_artist, "");
        assert_eq!(meta.tag_album, "");
        assert_eq!(meta.tag_title, "unknown");
    }
}
