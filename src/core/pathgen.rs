//! Destination path generation
//!
//! Layout: `{dst}/{artist}/{year - album}/[Disc NN/]{NN - }{title}{ext}`
//! with a `Various Artists/` root and an `{artist} - ` title prefix
//! for real compilations. Components are sanitized for portability
//! (Windows-hostile characters, trailing dots/spaces, length caps).

use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;

use crate::models::TrackMeta;
use crate::utils::dates::extract_year;

const MAX_COMPONENT_LEN: usize = 200;

lazy_static! {
    static ref MULTI_UNDERSCORE: Regex = Regex::new(r"_{2,}").unwrap();
}

/// Make one path component safe on every filesystem we care about
///
/// Idempotent: sanitizing a sanitized component is a no-op.
pub fn sanitize_component(component: &str) -> String {
    let mut result: String = component
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect();

    result = MULTI_UNDERSCORE.replace_all(&result, "_").to_string();

    if result.chars().count() > MAX_COMPONENT_LEN {
        result = result.chars().take(MAX_COMPONENT_LEN).collect();
    }

    // trailing dots and spaces are hostile on Windows shares
    result
        .trim_end_matches(|c| c == '.' || c == ' ')
        .trim_start()
        .to_string()
}

/// Compute the destination path for a cluster winner
///
/// `real_compilation` is the caller's verdict on whether the album
/// truly spans multiple artists (a compilation flag alone is not
/// enough); it switches on the Various Artists layout.
pub fn dest_path(
    dest_root: &Path,
    meta: &TrackMeta,
    src_path: &Path,
    real_compilation: bool,
) -> PathBuf {
    // artist folder
    let folder_artist = if real_compilation {
        "Various Artists".to_string()
    } else if !meta.tag_albumartist.is_empty() {
        meta.tag_albumartist.clone()
    } else if !meta.tag_artist.is_empty() {
        meta.tag_artist.clone()
    } else {
        "Unknown Artist".to_string()
    };

    // album folder, optionally year-prefixed
    let album = if meta.tag_album.is_empty() {
        "_Singles".to_string()
    } else {
        meta.tag_album.clone()
    };
    let album_folder = match extract_year(&meta.tag_date) {
        Some(year) => format!("{} - {}", year, album),
        None => album,
    };

    // filename: {trackPrefix}{artistPrefix}{title}{ext}
    let track_prefix = if meta.tag_track > 0 {
        if meta.tag_track_total >= 100 {
            format!("{:03} - ", meta.tag_track)
        } else {
            format!("{:02} - ", meta.tag_track)
        }
    } else {
        String::new()
    };

    let artist_prefix = if real_compilation && !meta.tag_artist.is_empty() {
        format!("{} - ", meta.tag_artist)
    } else {
        String::new()
    };

    let title = if meta.tag_title.is_empty() {
        src_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("untitled")
            .to_string()
    } else {
        meta.tag_title.clone()
    };

    let ext = src_path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default();

    let filename = format!("{}{}{}{}", track_prefix, artist_prefix, title, ext);

    let mut path = dest_root.to_path_buf();
    path.push(sanitize_component(&folder_artist));
    path.push(sanitize_component(&album_folder));

    // disc subfolder only for real multi-disc releases
    if meta.tag_disc_total > 1 && meta.tag_disc > 0 {
        path.push(sanitize_component(&format!("Disc {:02}", meta.tag_disc)));
    }

    path.push(sanitize_component(&filename));
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(
        albumartist: &str,
        artist: &str,
        album: &str,
        title: &str,
        date: &str,
        track: i32,
    ) -> TrackMeta {
        let mut m = TrackMeta::new(1);
        m.tag_albumartist = albumartist.to_string();
        m.tag_artist = artist.to_string();
        m.tag_album = album.to_string();
        m.tag_title = title.to_string();
        m.tag_date = date.to_string();
        m.tag_track = track;
        m
    }

    #[test]
    fn test_sanitize_component() {
        assert_eq!(sanitize_component("AC/DC: Best?"), "AC_DC_ Best_");
        assert_eq!(sanitize_component("a<b>c|d"), "a_b_c_d");
        assert_eq!(sanitize_component("name..."), "name");
        assert_eq!(sanitize_component("name   "), "name");
        assert_eq!(sanitize_component("a__b___c"), "a_b_c");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        for s in ["AC/DC: Best?", "trailing... ", "a__b", "ünïcode née"] {
            let once = sanitize_component(s);
            assert_eq!(sanitize_component(&once), once);
        }
    }

    #[test]
    fn test_sanitize_truncates() {
        let long = "x".repeat(500);
        let result = sanitize_component(&long);
        assert_eq!(result.chars().count(), 200);
        assert_eq!(sanitize_component(&result), result);
    }

    #[test]
    fn test_dest_path_complete_winner() {
        let m = meta("The Beatles", "The Beatles", "Abbey Road", "Come Together", "1969", 1);
        let path = dest_path(Path::new("/dest"), &m, Path::new("/src/x.mp3"), false);

        assert_eq!(
            path,
            PathBuf::from("/dest/The Beatles/1969 - Abbey Road/01 - Come Together.mp3")
        );
    }

    #[test]
    fn test_dest_path_disc_folder() {
        let mut m = meta("Artist", "Artist", "Album", "Song", "", 5);
        m.tag_disc = 2;
        m.tag_disc_total = 3;
        let path = dest_path(Path::new("/dest"), &m, Path::new("/src/x.flac"), false);

        assert_eq!(
            path,
            PathBuf::from("/dest/Artist/Album/Disc 02/05 - Song.flac")
        );
    }

    #[test]
    fn test_dest_path_singles_fallback() {
        let m = meta("", "Solo Artist", "", "Title", "", 0);
        let path = dest_path(Path::new("/dest"), &m, Path::new("/src/x.m4a"), false);

        assert_eq!(path, PathBuf::from("/dest/Solo Artist/_Singles/Title.m4a"));
    }

    #[test]
    fn test_dest_path_all_empty_metadata() {
        let m = meta("", "", "", "", "", 0);
        let path = dest_path(Path::new("/dest"), &m, Path::new("/src/unknown.mp3"), false);

        assert_eq!(
            path,
            PathBuf::from("/dest/Unknown Artist/_Singles/unknown.mp3")
        );
    }

    #[test]
    fn test_dest_path_compilation_layout() {
        let m = meta("", "Track Artist", "Now That's Music", "Hit Song", "2001", 7);
        let path = dest_path(Path::new("/dest"), &m, Path::new("/src/x.mp3"), true);

        assert_eq!(
            path,
            PathBuf::from("/dest/Various Artists/2001 - Now That's Music/07 - Track Artist - Hit Song.mp3")
        );
    }

    #[test]
    fn test_dest_path_three_digit_track_pad() {
        let mut m = meta("A", "A", "Big Box", "Song", "", 7);
        m.tag_track_total = 120;
        let path = dest_path(Path::new("/dest"), &m, Path::new("/src/x.mp3"), false);

        assert_eq!(path, PathBuf::from("/dest/A/Big Box/007 - Song.mp3"));
    }

    #[test]
    fn test_dest_path_disc_zero_has_no_disc_folder() {
        let mut m = meta("A", "A", "Album", "Song", "", 1);
        m.tag_disc = 0;
        m.tag_disc_total = 2;
        let path = dest_path(Path::new("/dest"), &m, Path::new("/src/x.mp3"), false);

        assert_eq!(path, PathBuf::from("/dest/A/Album/01 - Song.mp3"));
    }

    #[test]
    fn test_dest_path_extension_lowercased() {
        let m = meta("A", "A", "Album", "Song", "", 1);
        let path = dest_path(Path::new("/dest"), &m, Path::new("/src/x.FLAC"), false);

        assert_eq!(path, PathBuf::from("/dest/A/Album/01 - Song.flac"));
    }
}
