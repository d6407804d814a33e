//! Metadata stage: probe, read tags, merge, enrich, clean
//!
//! Each discovered file is probed for audio properties and read for
//! tags; the two sources merge with the probe authoritative on
//! properties and the tag reader authoritative on tag text. Sparse
//! results are enriched from the filename and directory structure,
//! then cleaned of release-scene debris. Only when both sources fail
//! does the file go to error.
//!
//! The heavy work (subprocess probe, tag decode) runs on blocking
//! threads inside a worker pool; results funnel back to this driver,
//! which is the only task writing to the store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;

use crate::config::Settings;
use crate::core::canonical::CanonicalClient;
use crate::core::enrich::{enrich_from_filename, enrich_from_path};
use crate::core::patterns::{clean_album, clean_artist, featured_guest, has_compilation_marker};
use crate::core::probe::{AudioProbe, AudioProps};
use crate::core::scoring::is_lossless_codec;
use crate::core::tagreader::{read_tags, TagData};
use crate::db::{Db, FileTable, MetadataTable};
use crate::models::{FileRecord, FileStatus, TrackMeta};
use crate::utils::dates::now_unix;
use crate::utils::events::{Event, EventSink};
use crate::utils::progress::{Counters, ProgressReporter};

/// Stage result counters
#[derive(Debug, Default, Clone)]
pub struct MetaOutcome {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
}

struct MetaResult {
    file: FileRecord,
    result: Result<TrackMeta, String>,
}

/// Run the metadata stage
pub async fn run_meta(
    db: &Db,
    settings: &Settings,
    probe: Arc<dyn AudioProbe>,
    events: &EventSink,
    cancel: Arc<AtomicBool>,
) -> Result<MetaOutcome> {
    let pool = db.pool();
    let files = FileTable::needing_meta(pool).await?;
    let total = files.len() as u64;

    if files.is_empty() {
        tracing::info!("meta: nothing to do");
        return Ok(MetaOutcome::default());
    }

    let counters = Counters::new();
    let reporter = ProgressReporter::start("meta", counters.clone(), total);

    let concurrency = settings.concurrency.max(1);
    let (work_tx, work_rx) = mpsc::channel::<FileRecord>(concurrency * 2);
    let (result_tx, mut result_rx) = mpsc::channel::<MetaResult>(concurrency * 2);
    let work_rx = Arc::new(tokio::sync::Mutex::new(work_rx));

    // worker pool: pull a file, extract on a blocking thread, report
    let mut workers = Vec::with_capacity(concurrency);
    for _ in 0..concurrency {
        let work_rx = Arc::clone(&work_rx);
        let result_tx = result_tx.clone();
        let probe = Arc::clone(&probe);
        let cancel = Arc::clone(&cancel);
        let src_root = settings.src_root.clone();

        workers.push(tokio::spawn(async move {
            loop {
                let file = {
                    let mut rx = work_rx.lock().await;
                    match rx.recv().await {
                        Some(file) => file,
                        None => break,
                    }
                };

                if cancel.load(Ordering::Relaxed) {
                    break;
                }

                let probe = Arc::clone(&probe);
                let root = src_root.clone();
                let path = PathBuf::from(&file.src_path);
                let extracted = tokio::task::spawn_blocking(move || {
                    extract_one(probe.as_ref(), &path, &root)
                })
                .await
                .unwrap_or_else(|e| Err(format!("extraction panicked: {}", e)));

                let result = MetaResult {
                    file,
                    result: extracted,
                };
                if result_tx.send(result).await.is_err() {
                    break;
                }
            }
        }));
    }
    drop(result_tx);

    // single producer feeding the bounded channel
    let producer = {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            for file in files {
                if cancel.load(Ordering::Relaxed) {
                    break;
                }
                if work_tx.send(file).await.is_err() {
                    break;
                }
            }
        })
    };

    // driver side: the only writer
    let mut outcome = MetaOutcome::default();
    let now = now_unix();

    while let Some(MetaResult { file, result }) = result_rx.recv().await {
        outcome.processed += 1;
        counters.add_processed();

        match result {
            Ok(mut meta) => {
                meta.file_id = file.id;
                MetadataTable::upsert(pool, &meta).await?;
                FileTable::set_status(pool, file.id, FileStatus::MetaOk, now).await?;
                events.emit(
                    &Event::new("meta", &file.file_key, &file.src_path)
                        .duration_ms(meta.duration_ms),
                );
                outcome.succeeded += 1;
                counters.add_succeeded();
            }
            Err(error) => {
                // failures to record the failure are swallowed so the
                // retry path stays intact on the next run
                if let Err(e) = FileTable::set_error(pool, file.id, &error, now).await {
                    tracing::warn!("failed to record error for {}: {}", file.file_key, e);
                }
                events.emit(&Event::new("meta", &file.file_key, &file.src_path).error(&error));
                outcome.failed += 1;
                counters.add_failed();
            }
        }
    }

    producer.await?;
    for worker in workers {
        worker.await?;
    }
    reporter.stop();

    if settings.sibling_enrichment && !cancel.load(Ordering::Relaxed) {
        enrich_from_siblings(db).await?;
    }

    if let Some(url) = &settings.canonical_url {
        if !cancel.load(Ordering::Relaxed) {
            fill_canonical_albumartists(db, url).await?;
        }
    }

    tracing::info!(
        "meta: {} processed, {} ok, {} failed",
        outcome.processed,
        outcome.succeeded,
        outcome.failed
    );

    Ok(outcome)
}

/// Extract, merge, enrich and clean metadata for one file
fn extract_one(
    probe: &dyn AudioProbe,
    path: &Path,
    src_root: &Path,
) -> Result<TrackMeta, String> {
    let probed = probe.probe(path);
    let tags = read_tags(path);

    let (probed, tags) = match (probed, tags) {
        (Err(pe), Err(te)) => {
            return Err(format!("probe failed: {}; tags failed: {}", pe, te));
        }
        (probed, tags) => (probed.ok(), tags.ok()),
    };

    let mut meta = TrackMeta::new(0);

    // probe output is authoritative for audio properties and seeds the
    // tag fields
    if let Some(props) = &probed {
        apply_probe(&mut meta, props);
    }

    // tag-reader values overlay tag fields when non-empty
    if let Some(tags) = &tags {
        apply_tags(&mut meta, tags);
    }

    meta.lossless = is_lossless_codec(&meta.codec);

    // enrichment fills only what is still empty
    enrich_from_filename(&mut meta, path);
    enrich_from_path(&mut meta, path, src_root);

    // cleaning
    meta.tag_artist = clean_artist(&meta.tag_artist);
    meta.tag_albumartist = clean_artist(&meta.tag_albumartist);
    meta.tag_album = clean_album(&meta.tag_album);

    if let Some(guest) = featured_guest(&meta.tag_title) {
        tracing::warn!(
            "title '{}' embeds a featured artist: {}",
            meta.tag_title,
            guest
        );
    }

    let path_str = path.to_string_lossy();
    if !meta.tag_compilation && has_compilation_marker(&path_str, &meta.tag_album) {
        meta.tag_compilation = true;
    }

    Ok(meta)
}

fn apply_probe(meta: &mut TrackMeta, props: &AudioProps) {
    meta.format = props.format.clone();
    meta.container = props.container.clone();
    meta.codec = props.codec.clone();
    meta.duration_ms = props.duration_ms;
    meta.sample_rate = props.sample_rate;
    meta.channels = props.channels;
    meta.bit_depth = props.bit_depth;
    meta.bitrate_kbps = props.bitrate_kbps;

    let get = |key: &str| props.tags.get(key).cloned().unwrap_or_default();

    meta.tag_artist = get("artist");
    meta.tag_album = get("album");
    meta.tag_title = get("title");
    meta.tag_albumartist = {
        let aa = get("album_artist");
        if aa.is_empty() { get("albumartist") } else { aa }
    };
    meta.tag_date = {
        let d = get("date");
        if d.is_empty() { get("year") } else { d }
    };

    // "3/12" shapes carry the total after the slash
    let (track, track_total) = parse_fraction(&get("track"));
    let (disc, disc_total) = parse_fraction(&get("disc"));
    meta.tag_track = track;
    meta.tag_track_total = track_total;
    meta.tag_disc = disc;
    meta.tag_disc_total = disc_total;

    for key in ["compilation", "tcmp", "cpil"] {
        let value = get(key);
        if !value.is_empty() {
            meta.tag_compilation = matches!(value.trim(), "1" | "true" | "yes");
            break;
        }
    }

    if meta.raw_tags.is_null() && !props.tags.is_empty() {
        meta.raw_tags = serde_json::to_value(&props.tags).unwrap_or(serde_json::Value::Null);
    }
}

fn apply_tags(meta: &mut TrackMeta, tags: &TagData) {
    if !tags.artist.is_empty() {
        meta.tag_artist = tags.artist.clone();
    }
    if !tags.album.is_empty() {
        meta.tag_album = tags.album.clone();
    }
    if !tags.title.is_empty() {
        meta.tag_title = tags.title.clone();
    }
    if !tags.albumartist.is_empty() {
        meta.tag_albumartist = tags.albumartist.clone();
    }
    if !tags.date.is_empty() {
        meta.tag_date = tags.date.clone();
    }
    if tags.track > 0 {
        meta.tag_track = tags.track;
    }
    if tags.track_total > 0 {
        meta.tag_track_total = tags.track_total;
    }
    if tags.disc > 0 {
        meta.tag_disc = tags.disc;
    }
    if tags.disc_total > 0 {
        meta.tag_disc_total = tags.disc_total;
    }
    if let Some(compilation) = tags.compilation {
        meta.tag_compilation = compilation;
    }
    if !tags.raw.is_null() {
        meta.raw_tags = tags.raw.clone();
    }
}

/// Parse "N" or "N/M" into (number, total)
fn parse_fraction(value: &str) -> (i32, i32) {
    let mut parts = value.split('/');
    let number = parts
        .next()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0);
    let total = parts
        .next()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0);
    (number, total)
}

/// Majority-vote fill across directory siblings
///
/// When two or more files in a directory agree on artist, album or
/// album-artist, the agreed value (strict majority) fills the same
/// field on siblings where it is still empty.
async fn enrich_from_siblings(db: &Db) -> Result<()> {
    let pool = db.pool();
    let files = FileTable::get_by_status(pool, FileStatus::MetaOk).await?;

    let mut by_dir: HashMap<PathBuf, Vec<i64>> = HashMap::new();
    for file in &files {
        if let Some(parent) = Path::new(&file.src_path).parent() {
            by_dir.entry(parent.to_path_buf()).or_default().push(file.id);
        }
    }

    let mut updated = 0u64;

    for (_, ids) in by_dir {
        if ids.len() < 2 {
            continue;
        }

        let mut metas = MetadataTable::get_many(pool, &ids).await?;
        if metas.len() < 2 {
            continue;
        }

        let artist = majority_value(&metas, |m| &m.tag_artist);
        let album = majority_value(&metas, |m| &m.tag_album);
        let albumartist = majority_value(&metas, |m| &m.tag_albumartist);

        for meta in metas.iter_mut() {
            let mut changed = false;

            if meta.tag_artist.is_empty() {
                if let Some(v) = &artist {
                    meta.tag_artist = v.clone();
                    changed = true;
                }
            }
            if meta.tag_album.is_empty() {
                if let Some(v) = &album {
                    meta.tag_album = v.clone();
                    changed = true;
                }
            }
            if meta.tag_albumartist.is_empty() {
                if let Some(v) = &albumartist {
                    meta.tag_albumartist = v.clone();
                    changed = true;
                }
            }

            if changed {
                MetadataTable::upsert(pool, meta).await?;
                updated += 1;
            }
        }
    }

    if updated > 0 {
        tracing::info!("sibling enrichment filled fields on {} files", updated);
    }

    Ok(())
}

/// The value held by a strict majority of siblings, if any
fn majority_value<F>(metas: &[TrackMeta], field: F) -> Option<String>
where
    F: Fn(&TrackMeta) -> &String,
{
    let total = metas.len();
    let mut counts: HashMap<&str, usize> = HashMap::new();

    for meta in metas {
        let value = field(meta);
        if !value.is_empty() {
            *counts.entry(value.as_str()).or_default() += 1;
        }
    }

    counts
        .into_iter()
        .find(|(_, count)| count * 2 > total)
        .map(|(value, _)| value.to_string())
}

/// Fill empty album-artists from the canonical form of the artist
///
/// Advisory only: no non-empty tag is ever overwritten.
async fn fill_canonical_albumartists(db: &Db, base_url: &str) -> Result<()> {
    let pool = db.pool();
    let client = CanonicalClient::new(base_url);
    let metas = MetadataTable::all(pool).await?;

    let mut filled = 0u64;

    for mut meta in metas {
        if !meta.tag_albumartist.is_empty() || meta.tag_artist.is_empty() {
            continue;
        }

        if let Some(canonical) = client.canonical_name(&meta.tag_artist).await {
            meta.tag_albumartist = canonical;
            MetadataTable::upsert(pool, &meta).await?;
            filled += 1;
        }
    }

    if filled > 0 {
        tracing::info!("canonical lookup filled {} album-artists", filled);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fraction() {
        assert_eq!(parse_fraction("3/12"), (3, 12));
        assert_eq!(parse_fraction("7"), (7, 0));
        assert_eq!(parse_fraction(""), (0, 0));
        assert_eq!(parse_fraction("x/y"), (0, 0));
        assert_eq!(parse_fraction(" 2 / 2 "), (2, 2));
    }

    #[test]
    fn test_majority_value() {
        let mut a = TrackMeta::new(1);
        a.tag_artist = "Queen".to_string();
        let mut b = TrackMeta::new(2);
        b.tag_artist = "Queen".to_string();
        let mut c = TrackMeta::new(3);
        c.tag_artist = String::new();

        let metas = vec![a, b, c];
        assert_eq!(
            majority_value(&metas, |m| &m.tag_artist),
            Some("Queen".to_string())
        );

        // a 50/50 split is not a strict majority
        let mut d = TrackMeta::new(4);
        d.tag_artist = "Not Queen".to_string();
        let mut e = TrackMeta::new(5);
        e.tag_artist = "Queen".to_string();
        let metas = vec![d, e];
        assert_eq!(majority_value(&metas, |m| &m.tag_artist), None);
    }

    struct StubProbe(AudioProps);

    impl AudioProbe for StubProbe {
        fn probe(&self, _path: &Path) -> Result<AudioProps, crate::error::SweepError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_extract_merges_probe_and_enrichment() {
        let mut props = AudioProps::default();
        props.format = "mp3".to_string();
        props.codec = "mp3".to_string();
        props.duration_ms = 200_000;
        props.sample_rate = 44_100;
        props.bitrate_kbps = 320;

        let probe = StubProbe(props);
        // the tag reader fails on a path that does not exist; the probe
        // side alone must still carry the merge
        let meta = extract_one(
            &probe,
            Path::new("/music/Artist/2005 - Helen Savage/01 - Helen Savage (Original Mix).mp3"),
            Path::new("/music"),
        )
        .unwrap();

        assert_eq!(meta.codec, "mp3");
        assert!(!meta.lossless);
        assert_eq!(meta.tag_artist, "Artist");
        assert_eq!(meta.tag_album, "Helen Savage");
        assert_eq!(meta.tag_date, "2005");
        assert_eq!(meta.tag_track, 1);
        assert_eq!(meta.tag_title, "Helen Savage (Original Mix)");
    }

    #[test]
    fn test_extract_flags_compilation_from_path() {
        let mut props = AudioProps::default();
        props.codec = "mp3".to_string();

        let probe = StubProbe(props);
        let meta = extract_one(
            &probe,
            Path::new("/music/Various Artists/Hits/01 - Song.mp3"),
            Path::new("/music"),
        )
        .unwrap();

        assert!(meta.tag_compilation);
    }
}
