//! Quality scoring and winner selection
//!
//! Every cluster member gets a score summed from codec class, bit
//! depth, sample rate, tag completeness and (for lossless rips) file
//! size. The highest score wins the cluster; ties fall to the larger
//! file, then the older mtime, then the lexicographically smaller
//! source path.

use std::cmp::Ordering;

use crate::models::{FileRecord, TrackMeta};

/// Codecs that mean a lossless rip
const LOSSLESS_CODECS: &[&str] = &[
    "flac", "alac", "ape", "wavpack", "wv", "tta", "pcm", "wav", "aiff",
];

/// Lossless codec, by name or pcm_* family
pub fn is_lossless_codec(codec: &str) -> bool {
    let codec = codec.to_lowercase();
    LOSSLESS_CODECS.contains(&codec.as_str()) || codec.starts_with("pcm_")
}

/// Score contribution of the codec (and bitrate for lossy codecs)
pub fn codec_score(codec: &str, bitrate_kbps: i32) -> f64 {
    let codec = codec.to_lowercase();

    match codec.as_str() {
        "flac" | "alac" => 43.0,
        "ape" | "wavpack" | "wv" | "tta" => 42.0,
        "wav" | "aiff" => 42.0,
        c if c.starts_with("pcm") => 42.0,
        "mp3" => match bitrate_kbps {
            b if b >= 320 => 22.0,
            b if b >= 256 => 20.0,
            b if b >= 192 => 17.0,
            b if b >= 128 => 13.0,
            _ => 8.0,
        },
        "aac" => match bitrate_kbps {
            b if b >= 256 => 26.0,
            b if b >= 192 => 23.0,
            _ => 18.0,
        },
        "opus" => {
            if bitrate_kbps >= 128 {
                25.0
            } else {
                20.0
            }
        }
        "vorbis" => {
            if bitrate_kbps >= 256 {
                24.0
            } else {
                19.0
            }
        }
        _ => 0.0,
    }
}

/// Size adjustment: lossless rips only, scaled by size, small and capped
fn size_score(lossless: bool, size_bytes: i64) -> f64 {
    if !lossless || size_bytes <= 0 {
        return 0.0;
    }
    (size_bytes as f64 / (100.0 * 1024.0 * 1024.0)).min(2.0)
}

/// Compute the quality score for one cluster member
pub fn quality_score(meta: &TrackMeta, size_bytes: i64) -> f64 {
    let mut score = codec_score(&meta.codec, meta.bitrate_kbps);

    if meta.lossless {
        score += 10.0;
    }

    score += match meta.bit_depth {
        d if d >= 24 => 5.0,
        d if d >= 20 => 3.0,
        d if d >= 16 => 0.0,
        _ => -2.0,
    };

    score += match meta.sample_rate {
        r if r >= 96_000 => 5.0,
        r if r >= 48_000 => 2.0,
        r if r >= 44_100 => 0.0,
        r if r >= 32_000 => -1.0,
        _ => -3.0,
    };

    let mut tag_points = 0.0;
    if !meta.tag_artist.is_empty() {
        tag_points += 1.0;
    }
    if !meta.tag_album.is_empty() {
        tag_points += 1.0;
    }
    if !meta.tag_title.is_empty() {
        tag_points += 1.0;
    }
    if meta.tag_track > 0 {
        tag_points += 1.0;
    }
    if tag_points == 4.0 {
        tag_points += 1.0;
    }
    score += tag_points;

    score += size_score(meta.lossless, size_bytes);

    score
}

/// Closeness of two durations, for cross-cluster comparisons
pub fn duration_proximity(a_ms: i64, b_ms: i64) -> f64 {
    let diff = (a_ms - b_ms).abs();
    match diff {
        d if d <= 1_500 => 6.0,
        d if d <= 3_000 => 3.0,
        d if d <= 5_000 => 1.0,
        _ => -2.0,
    }
}

/// Tie-break order for equal scores: larger file, then older mtime,
/// then lexicographically smaller source path
pub fn winner_order(
    a: (f64, &FileRecord),
    b: (f64, &FileRecord),
) -> Ordering {
    let (score_a, file_a) = a;
    let (score_b, file_b) = b;

    score_a
        .partial_cmp(&score_b)
        .unwrap_or(Ordering::Equal)
        .then_with(|| file_a.size_bytes.cmp(&file_b.size_bytes))
        .then_with(|| file_b.mtime_unix.cmp(&file_a.mtime_unix))
        .then_with(|| file_b.src_path.cmp(&file_a.src_path))
}

/// Index of the winning member among (score, file) pairs
pub fn pick_winner(scored: &[(f64, FileRecord)]) -> Option<usize> {
    if scored.is_empty() {
        return None;
    }

    let mut best = 0;
    for i in 1..scored.len() {
        let a = (scored[i].0, &scored[i].1);
        let b = (scored[best].0, &scored[best].1);
        if winner_order(a, b) == Ordering::Greater {
            best = i;
        }
    }

    Some(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileStatus;

    fn file(id: i64, size: i64, mtime: i64, path: &str) -> FileRecord {
        FileRecord {
            id,
            file_key: path.to_string(),
            src_path: path.to_string(),
            size_bytes: size,
            mtime_unix: mtime,
            sha1: None,
            status: FileStatus::MetaOk,
            last_error: None,
            created_at: 0,
            last_update_at: 0,
        }
    }

    fn full_tags(meta: &mut TrackMeta) {
        meta.tag_artist = "Artist".to_string();
        meta.tag_album = "Album".to_string();
        meta.tag_title = "Title".to_string();
        meta.tag_track = 1;
    }

    #[test]
    fn test_is_lossless_codec() {
        assert!(is_lossless_codec("flac"));
        assert!(is_lossless_codec("FLAC"));
        assert!(is_lossless_codec("alac"));
        assert!(is_lossless_codec("pcm_s16le"));
        assert!(!is_lossless_codec("mp3"));
        assert!(!is_lossless_codec("aac"));
    }

    #[test]
    fn test_high_quality_flac_score_range() {
        let mut meta = TrackMeta::new(1);
        meta.codec = "flac".to_string();
        meta.lossless = true;
        meta.bit_depth = 24;
        meta.sample_rate = 96_000;
        full_tags(&mut meta);

        let score = quality_score(&meta, 40 * 1024 * 1024);
        assert!((60.0..=70.0).contains(&score), "score was {}", score);
    }

    #[test]
    fn test_untagged_mp3_score_range() {
        let mut meta = TrackMeta::new(1);
        meta.codec = "mp3".to_string();
        meta.bitrate_kbps = 128;
        meta.sample_rate = 44_100;

        let score = quality_score(&meta, 4 * 1024 * 1024);
        assert!((10.0..=13.0).contains(&score), "score was {}", score);
    }

    #[test]
    fn test_codec_score_case_insensitive() {
        assert_eq!(codec_score("MP3", 320), codec_score("mp3", 320));
        assert_eq!(codec_score("FLAC", 0), 43.0);
    }

    #[test]
    fn test_codec_ladders() {
        assert_eq!(codec_score("mp3", 320), 22.0);
        assert_eq!(codec_score("mp3", 256), 20.0);
        assert_eq!(codec_score("mp3", 192), 17.0);
        assert_eq!(codec_score("mp3", 128), 13.0);
        assert_eq!(codec_score("aac", 256), 26.0);
        assert_eq!(codec_score("aac", 192), 23.0);
        assert_eq!(codec_score("opus", 128), 25.0);
        assert_eq!(codec_score("vorbis", 256), 24.0);
        assert_eq!(codec_score("midi", 0), 0.0);
    }

    #[test]
    fn test_no_size_bonus_for_lossy() {
        let mut lossy = TrackMeta::new(1);
        lossy.codec = "mp3".to_string();
        lossy.bitrate_kbps = 320;
        lossy.sample_rate = 44_100;

        let small = quality_score(&lossy, 1024);
        let huge = quality_score(&lossy, 500 * 1024 * 1024);
        assert_eq!(small, huge);
    }

    #[test]
    fn test_winner_is_highest_score() {
        let scored = vec![
            (50.0, file(1, 100, 10, "/a")),
            (60.0, file(2, 100, 10, "/b")),
            (40.0, file(3, 100, 10, "/c")),
        ];

        assert_eq!(pick_winner(&scored), Some(1));
    }

    #[test]
    fn test_tie_breaks() {
        // equal scores: larger file wins
        let scored = vec![
            (50.0, file(1, 100, 10, "/a")),
            (50.0, file(2, 200, 10, "/b")),
        ];
        assert_eq!(pick_winner(&scored), Some(1));

        // equal scores and sizes: older mtime wins
        let scored = vec![
            (50.0, file(1, 100, 20, "/a")),
            (50.0, file(2, 100, 10, "/b")),
        ];
        assert_eq!(pick_winner(&scored), Some(1));

        // all equal: lexicographically smaller path wins
        let scored = vec![
            (50.0, file(1, 100, 10, "/zz")),
            (50.0, file(2, 100, 10, "/aa")),
        ];
        assert_eq!(pick_winner(&scored), Some(1));
    }

    #[test]
    fn test_duration_proximity() {
        assert_eq!(duration_proximity(120_000, 121_000), 6.0);
        assert_eq!(duration_proximity(120_000, 122_500), 3.0);
        assert_eq!(duration_proximity(120_000, 124_500), 1.0);
        assert_eq!(duration_proximity(120_000, 130_000), -2.0);
    }
}
