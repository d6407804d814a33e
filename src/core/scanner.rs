//! Scan stage: discover audio files under the source root
//!
//! Walks the tree, filters on the configured extension set, and
//! upserts one file row per audio file. A re-scan of an unchanged
//! tree inserts nothing and only refreshes bookkeeping fields, so the
//! stage is idempotent.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::{bail, Result};
use walkdir::{DirEntry, WalkDir};

use crate::config::Settings;
use crate::db::{Db, FileTable, UpsertOutcome};
use crate::models::FileRecord;
use crate::utils::dates::now_unix;
use crate::utils::events::{Event, EventSink};

/// Stage result counters
#[derive(Debug, Default, Clone)]
pub struct ScanOutcome {
    pub discovered: u64,
    pub refreshed: u64,
    pub dir_errors: u64,
}

/// A file found on disk, before it hits the store
#[derive(Debug)]
struct FoundFile {
    path: PathBuf,
    size_bytes: i64,
    mtime_unix: i64,
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

fn walk_source(settings: &Settings, events: &EventSink) -> (Vec<FoundFile>, u64) {
    let mut found = Vec::new();
    let mut dir_errors = 0;

    // the filter also sees the root entry; a root that happens to be
    // dot-named must still be walked
    let walker = WalkDir::new(&settings.src_root)
        .follow_links(settings.follow_symlinks)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                // unreadable directory: report and keep walking
                let path = e
                    .path()
                    .map(|p| p.to_string_lossy().to_string())
                    .unwrap_or_default();
                tracing::warn!("cannot read {}: {}", path, e);
                events.emit(&Event::new("scan", &path, &path).error(&e.to_string()));
                dir_errors += 1;
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let is_audio = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| settings.is_audio_extension(ext))
            .unwrap_or(false);
        if !is_audio {
            continue;
        }

        match entry.metadata() {
            Ok(meta) => {
                let mtime = meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_secs() as i64)
                    .unwrap_or(0);
                found.push(FoundFile {
                    path: entry.path().to_path_buf(),
                    size_bytes: meta.len() as i64,
                    mtime_unix: mtime,
                });
            }
            Err(e) => {
                tracing::warn!("cannot stat {}: {}", entry.path().display(), e);
                dir_errors += 1;
            }
        }
    }

    (found, dir_errors)
}

/// Run the scan stage
pub async fn run_scan(db: &Db, settings: &Settings, events: &EventSink) -> Result<ScanOutcome> {
    if !settings.src_root.exists() {
        bail!("source root not found: {}", settings.src_root.display());
    }

    let walk_settings = settings.clone();
    let walk_events = events.clone();
    let (found, dir_errors) =
        tokio::task::spawn_blocking(move || walk_source(&walk_settings, &walk_events)).await?;

    let mut outcome = ScanOutcome {
        dir_errors,
        ..Default::default()
    };

    let pool = db.pool();
    let now = now_unix();

    for file in &found {
        let src_path = file.path.to_string_lossy().to_string();
        let record = FileRecord::discovered(src_path.clone(), file.size_bytes, file.mtime_unix, now);

        match FileTable::upsert(pool, &record).await? {
            UpsertOutcome::Inserted => {
                events.emit(&Event::new("scan", &record.file_key, &src_path));
                outcome.discovered += 1;
            }
            UpsertOutcome::Refreshed => outcome.refreshed += 1,
        }
    }

    tracing::info!(
        "scan: {} discovered, {} refreshed, {} unreadable",
        outcome.discovered,
        outcome.refreshed,
        outcome.dir_errors
    );

    Ok(outcome)
}

/// Expose the audio check for directory listings elsewhere
pub fn is_audio_file(settings: &Settings, path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| settings.is_audio_extension(ext))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_audio_file() {
        let settings = Settings::default();
        assert!(is_audio_file(&settings, Path::new("song.mp3")));
        assert!(is_audio_file(&settings, Path::new("song.FLAC")));
        assert!(!is_audio_file(&settings, Path::new("README.txt")));
        assert!(!is_audio_file(&settings, Path::new("noext")));
    }
}
