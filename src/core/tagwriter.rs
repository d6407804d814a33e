//! Tag stamping on materialized outputs
//!
//! After a copy or move verifies, the enriched tags can be written
//! onto the destination file. The writer shells out to ffmpeg with
//! `-c copy` (no re-encode) into a temp file, then atomically replaces
//! the destination. Stamping is best-effort: a failure is warned about
//! and never fails the execution.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use ffmpeg_sidecar::paths::ffmpeg_path;

use crate::error::SweepError;
use crate::models::TrackMeta;

/// Narrow tag-writer interface; swap in a no-op for tests
pub trait TagWriter: Send + Sync {
    fn write_tags(&self, path: &Path, tags: &[(String, String)]) -> Result<(), SweepError>;
}

/// Build the key=value pairs worth stamping from merged metadata
pub fn tag_pairs(meta: &TrackMeta) -> Vec<(String, String)> {
    let mut pairs = Vec::new();

    let mut push = |key: &str, value: &str| {
        if !value.is_empty() {
            pairs.push((key.to_string(), value.to_string()));
        }
    };

    push("artist", &meta.tag_artist);
    push("album", &meta.tag_album);
    push("title", &meta.tag_title);
    push("album_artist", &meta.tag_albumartist);
    push("date", &meta.tag_date);

    if meta.tag_track > 0 {
        let track = if meta.tag_track_total > 0 {
            format!("{}/{}", meta.tag_track, meta.tag_track_total)
        } else {
            meta.tag_track.to_string()
        };
        pairs.push(("track".to_string(), track));
    }
    if meta.tag_disc > 0 {
        let disc = if meta.tag_disc_total > 0 {
            format!("{}/{}", meta.tag_disc, meta.tag_disc_total)
        } else {
            meta.tag_disc.to_string()
        };
        pairs.push(("disc".to_string(), disc));
    }
    if meta.tag_compilation {
        pairs.push(("compilation".to_string(), "1".to_string()));
    }

    pairs
}

/// ffmpeg-backed tag writer
#[derive(Debug, Clone)]
pub struct FfmpegTagWriter {
    binary: PathBuf,
}

impl FfmpegTagWriter {
    pub fn new() -> Self {
        Self {
            binary: ffmpeg_path(),
        }
    }
}

impl Default for FfmpegTagWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl TagWriter for FfmpegTagWriter {
    fn write_tags(&self, path: &Path, tags: &[(String, String)]) -> Result<(), SweepError> {
        if tags.is_empty() {
            return Ok(());
        }

        // same directory, same extension: ffmpeg infers the container
        // from the temp name, and the final rename stays atomic
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("tmp");
        let temp = path.with_extension(format!("stamp.{}", ext));

        let mut cmd = Command::new(&self.binary);
        cmd.arg("-i").arg(path);
        for (key, value) in tags {
            cmd.arg("-metadata").arg(format!("{}={}", key, value));
        }
        cmd.args(["-c", "copy", "-y"]).arg(&temp);

        let output = cmd
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| SweepError::Unreadable(path.to_path_buf(), e.to_string()))?;

        if !output.status.success() {
            let _ = std::fs::remove_file(&temp);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SweepError::DecodeFailed(format!(
                "tag stamping failed: {}",
                stderr.lines().last().unwrap_or("unknown")
            )));
        }

        std::fs::rename(&temp, path).map_err(|e| {
            let _ = std::fs::remove_file(&temp);
            SweepError::from_io(path, e)
        })
    }
}

/// Writer that does nothing; used when stamping is disabled
#[derive(Debug, Clone, Default)]
pub struct NoopTagWriter;

impl TagWriter for NoopTagWriter {
    fn write_tags(&self, _path: &Path, _tags: &[(String, String)]) -> Result<(), SweepError> {
        Ok(())
    }
}
