//! Stage-level integration tests
//!
//! These drive the real stages against temp directories and an
//! in-memory store. The probe is stubbed so no external binary is
//! needed; the files on disk are plain bytes, which the tag reader
//! rejects - the merge tolerates that as long as the probe succeeds.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tunesweep::config::Settings;
use tunesweep::core::probe::{AudioProbe, AudioProps};
use tunesweep::core::tagwriter::NoopTagWriter;
use tunesweep::core::{run_cluster, run_execute, run_meta, run_plan, run_scan};
use tunesweep::db::{ClusterTable, Db, ExecutionTable, FileTable, MetadataTable, PlanTable};
use tunesweep::error::SweepError;
use tunesweep::models::{FileRecord, FileStatus, PlanAction, TrackMeta, VerifyMode};
use tunesweep::utils::events::EventSink;

/// Probe stub keyed by file name; unknown names fail the probe
struct StubProbe {
    by_name: HashMap<String, AudioProps>,
}

impl StubProbe {
    fn new() -> Self {
        Self {
            by_name: HashMap::new(),
        }
    }

    fn with(mut self, name: &str, props: AudioProps) -> Self {
        self.by_name.insert(name.to_string(), props);
        self
    }
}

impl AudioProbe for StubProbe {
    fn probe(&self, path: &Path) -> Result<AudioProps, SweepError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        self.by_name
            .get(name)
            .cloned()
            .ok_or_else(|| SweepError::ProbeFailed(format!("no stub for {}", name)))
    }
}

fn mp3_props(duration_ms: i64, bitrate: i32) -> AudioProps {
    AudioProps {
        format: "mp3".to_string(),
        container: "mp3".to_string(),
        codec: "mp3".to_string(),
        duration_ms,
        sample_rate: 44_100,
        channels: 2,
        bit_depth: 0,
        bitrate_kbps: bitrate,
        tags: HashMap::new(),
    }
}

fn flac_props(duration_ms: i64) -> AudioProps {
    AudioProps {
        format: "flac".to_string(),
        container: "flac".to_string(),
        codec: "flac".to_string(),
        duration_ms,
        sample_rate: 96_000,
        channels: 2,
        bit_depth: 24,
        bitrate_kbps: 0,
        tags: HashMap::new(),
    }
}

fn settings(src: &Path, dst: &Path) -> Settings {
    Settings {
        src_root: src.to_path_buf(),
        dest_root: dst.to_path_buf(),
        ..Default::default()
    }
}

fn cancel() -> Arc<AtomicBool> {
    Arc::new(AtomicBool::new(false))
}

/// Seed a file row directly (bypassing scan) and return its id
async fn seed_file(db: &Db, path: &Path, size: i64, mtime: i64) -> i64 {
    let src = path.to_string_lossy().to_string();
    let record = FileRecord::discovered(src.clone(), size, mtime, 1_000);
    FileTable::upsert(db.pool(), &record).await.unwrap();

    let stored = FileTable::get_by_key(db.pool(), &src).await.unwrap().unwrap();
    stored.id
}

/// Seed metadata and advance the file to meta_ok
async fn seed_meta(db: &Db, file_id: i64, mut meta: TrackMeta) {
    meta.file_id = file_id;
    MetadataTable::upsert(db.pool(), &meta).await.unwrap();
    FileTable::set_status(db.pool(), file_id, FileStatus::MetaOk, 1_001)
        .await
        .unwrap();
}

fn basic_meta(codec: &str, artist: &str, title: &str, duration_ms: i64) -> TrackMeta {
    let mut meta = TrackMeta::new(0);
    meta.codec = codec.to_string();
    meta.lossless = codec == "flac";
    meta.tag_artist = artist.to_string();
    meta.tag_title = title.to_string();
    meta.duration_ms = duration_ms;
    if codec == "mp3" {
        meta.sample_rate = 44_100;
        meta.bitrate_kbps = 192;
    } else {
        meta.sample_rate = 96_000;
        meta.bit_depth = 24;
    }
    meta
}

#[tokio::test]
async fn scan_discovers_audio_and_is_idempotent() {
    let src = tempfile::tempdir().unwrap();
    let album = src.path().join("Artist/Album");
    std::fs::create_dir_all(&album).unwrap();
    std::fs::write(album.join("01 - T.mp3"), b"mp3 bytes").unwrap();
    std::fs::write(album.join("02 - T.flac"), b"flac bytes").unwrap();
    std::fs::write(album.join("README.txt"), b"not audio").unwrap();

    let db = Db::open_memory().await.unwrap();
    let dst = tempfile::tempdir().unwrap();
    let settings = settings(src.path(), dst.path());
    let events = EventSink::disabled();

    let outcome = run_scan(&db, &settings, &events).await.unwrap();
    assert_eq!(outcome.discovered, 2);
    assert_eq!(outcome.refreshed, 0);

    let discovered = FileTable::get_by_status(db.pool(), FileStatus::Discovered)
        .await
        .unwrap();
    assert_eq!(discovered.len(), 2);
    assert!(discovered
        .iter()
        .all(|f| !f.src_path.ends_with("README.txt")));

    // unchanged tree: zero new inserts
    let again = run_scan(&db, &settings, &events).await.unwrap();
    assert_eq!(again.discovered, 0);
    assert_eq!(again.refreshed, 2);
    assert_eq!(FileTable::count(db.pool()).await.unwrap(), 2);
}

#[tokio::test]
async fn scan_missing_root_is_fatal() {
    let db = Db::open_memory().await.unwrap();
    let dst = tempfile::tempdir().unwrap();
    let settings = settings(Path::new("/definitely/not/here"), dst.path());

    let result = run_scan(&db, &settings, &EventSink::disabled()).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn meta_enriches_from_path_and_marks_failures() {
    let src = tempfile::tempdir().unwrap();
    let album = src.path().join("Artist/2005 - Helen Savage");
    std::fs::create_dir_all(&album).unwrap();
    let good = album.join("01 - Helen Savage (Original Mix).mp3");
    let bad = album.join("02 - Corrupt.mp3");
    std::fs::write(&good, b"pretend audio").unwrap();
    std::fs::write(&bad, b"pretend audio").unwrap();

    let db = Db::open_memory().await.unwrap();
    let dst = tempfile::tempdir().unwrap();
    let settings = settings(src.path(), dst.path());
    let events = EventSink::disabled();

    run_scan(&db, &settings, &events).await.unwrap();

    // stub covers only the good file; the bad one fails probe + tags
    let probe = Arc::new(
        StubProbe::new().with("01 - Helen Savage (Original Mix).mp3", mp3_props(201_000, 320)),
    );
    let outcome = run_meta(&db, &settings, probe, &events, cancel())
        .await
        .unwrap();

    assert_eq!(outcome.processed, 2);
    assert_eq!(outcome.succeeded, 1);
    assert_eq!(outcome.failed, 1);

    let good_file = FileTable::get_by_key(db.pool(), &good.to_string_lossy())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(good_file.status, FileStatus::MetaOk);

    let meta = MetadataTable::get(db.pool(), good_file.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(meta.codec, "mp3");
    assert_eq!(meta.tag_artist, "Artist");
    assert_eq!(meta.tag_album, "Helen Savage");
    assert_eq!(meta.tag_date, "2005");
    assert_eq!(meta.tag_track, 1);
    assert_eq!(meta.tag_title, "Helen Savage (Original Mix)");

    let bad_file = FileTable::get_by_key(db.pool(), &bad.to_string_lossy())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bad_file.status, FileStatus::Error);
    assert!(bad_file.last_error.is_some());

    // a re-run retries the failed file and nothing else
    let probe = Arc::new(StubProbe::new().with("02 - Corrupt.mp3", mp3_props(202_000, 128)));
    let retry = run_meta(&db, &settings, probe, &events, cancel())
        .await
        .unwrap();
    assert_eq!(retry.processed, 1);
    assert_eq!(retry.succeeded, 1);
}

#[tokio::test]
async fn cluster_groups_duplicates_and_reruns_cleanly() {
    let db = Db::open_memory().await.unwrap();

    // two rips of the same recording, one of something else
    let a = seed_file(&db, Path::new("/lib/a/yesterday.mp3"), 5_000_000, 100).await;
    let b = seed_file(&db, Path::new("/lib/b/yesterday.flac"), 30_000_000, 90).await;
    let c = seed_file(&db, Path::new("/lib/c/other.mp3"), 4_000_000, 80).await;

    seed_meta(&db, a, basic_meta("mp3", "The Beatles", "Yesterday", 125_000)).await;
    seed_meta(&db, b, basic_meta("flac", "The Beatles", "Yesterday", 126_200)).await;
    seed_meta(&db, c, basic_meta("mp3", "The Beatles", "Something", 182_000)).await;

    let outcome = run_cluster(&db).await.unwrap();
    assert_eq!(outcome.processed, 3);
    assert_eq!(outcome.clusters_total, 2);

    let members = ClusterTable::members(db.pool(), "the beatles|yesterday|studio|126|disc0")
        .await
        .unwrap();
    assert_eq!(members.len(), 2);

    // re-running inserts nothing new
    let again = run_cluster(&db).await.unwrap();
    assert_eq!(again.clusters_total, 2);
    let members = ClusterTable::members(db.pool(), "the beatles|yesterday|studio|126|disc0")
        .await
        .unwrap();
    assert_eq!(members.len(), 2);
}

#[tokio::test]
async fn plan_picks_winner_and_skips_losers() {
    let db = Db::open_memory().await.unwrap();
    let dst = tempfile::tempdir().unwrap();
    let settings = settings(Path::new("/lib"), dst.path());
    let events = EventSink::disabled();

    let mp3 = seed_file(&db, Path::new("/lib/a/yesterday.mp3"), 5_000_000, 100).await;
    let flac = seed_file(&db, Path::new("/lib/b/yesterday.flac"), 30_000_000, 90).await;
    seed_meta(&db, mp3, basic_meta("mp3", "The Beatles", "Yesterday", 125_000)).await;
    seed_meta(&db, flac, basic_meta("flac", "The Beatles", "Yesterday", 125_500)).await;

    run_cluster(&db).await.unwrap();
    let outcome = run_plan(&db, &settings, &events).await.unwrap();
    assert_eq!(outcome.planned, 1);
    assert_eq!(outcome.skipped, 1);

    // exactly one preferred member
    let members = ClusterTable::members(db.pool(), "the beatles|yesterday|studio|126|disc0")
        .await
        .unwrap();
    assert_eq!(members.iter().filter(|m| m.preferred).count(), 1);
    assert!(members.iter().all(|m| m.quality_score > 0.0));

    let winner_plan = PlanTable::get(db.pool(), flac).await.unwrap().unwrap();
    assert_eq!(winner_plan.action, PlanAction::Copy);
    assert!(winner_plan.dest_path.ends_with("Yesterday.flac"));
    assert!(winner_plan.reason.contains("winner"));

    let loser_plan = PlanTable::get(db.pool(), mp3).await.unwrap().unwrap();
    assert_eq!(loser_plan.action, PlanAction::Skip);
    assert!(loser_plan.dest_path.is_empty());
    assert!(loser_plan.reason.contains("duplicate of"));

    // planning again from scratch is stable
    let rerun = run_plan(&db, &settings, &events).await.unwrap();
    assert_eq!(rerun.planned, 1);
    let plans = PlanTable::all(db.pool()).await.unwrap();
    assert_eq!(plans.len(), 2);
}

#[tokio::test]
async fn plan_resolves_destination_collisions() {
    let db = Db::open_memory().await.unwrap();
    let dst = tempfile::tempdir().unwrap();
    let settings = settings(Path::new("/lib"), dst.path());
    let events = EventSink::disabled();

    // durations far apart: different clusters, same tags, same dest
    let hi = seed_file(&db, Path::new("/lib/a/song.flac"), 30_000_000, 100).await;
    let lo = seed_file(&db, Path::new("/lib/b/song.flac"), 5_000_000, 100).await;
    seed_meta(&db, hi, basic_meta("flac", "Artist", "Song", 120_000)).await;
    let mut weaker = basic_meta("flac", "Artist", "Song", 200_000);
    weaker.bit_depth = 16;
    weaker.sample_rate = 44_100;
    seed_meta(&db, lo, weaker).await;

    run_cluster(&db).await.unwrap();
    let outcome = run_plan(&db, &settings, &events).await.unwrap();

    assert_eq!(outcome.planned, 1);
    assert_eq!(outcome.collisions, 1);

    let demoted = PlanTable::get(db.pool(), lo).await.unwrap().unwrap();
    assert_eq!(demoted.action, PlanAction::Skip);
    assert!(demoted.reason.contains("path collision"));

    // post-condition: non-skip destinations are unique
    let non_skip = PlanTable::non_skip(db.pool()).await.unwrap();
    let mut dests: Vec<&str> = non_skip.iter().map(|p| p.dest_path.as_str()).collect();
    dests.sort();
    dests.dedup();
    assert_eq!(dests.len(), non_skip.len());
}

/// Full copy + verify round trip on real files
#[tokio::test]
async fn execute_copies_and_verifies() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    let db = Db::open_memory().await.unwrap();
    let events = EventSink::disabled();

    let src_file = src.path().join("take1.flac");
    let body = b"flac-shaped bytes for the copy test";
    std::fs::write(&src_file, body).unwrap();

    let id = seed_file(&db, &src_file, body.len() as i64, 100).await;
    seed_meta(&db, id, basic_meta("flac", "Artist", "Song", 120_000)).await;

    let mut settings = settings(src.path(), dst.path());
    settings.verify = VerifyMode::Hash;

    run_cluster(&db).await.unwrap();
    run_plan(&db, &settings, &events).await.unwrap();

    let outcome = run_execute(&db, &settings, Arc::new(NoopTagWriter), &events, cancel())
        .await
        .unwrap();
    assert_eq!(outcome.succeeded, 1);
    assert_eq!(outcome.failed, 0);
    assert_eq!(outcome.bytes_written, body.len() as i64);

    let plan = PlanTable::get(db.pool(), id).await.unwrap().unwrap();
    let dest = PathBuf::from(&plan.dest_path);
    assert_eq!(std::fs::read(&dest).unwrap(), body);
    assert!(!dest.with_file_name("Song.flac.part").exists());

    let execution = ExecutionTable::get(db.pool(), id).await.unwrap().unwrap();
    assert!(execution.verify_ok);
    assert!(execution.error.is_none());

    let file = FileTable::get(db.pool(), id).await.unwrap().unwrap();
    assert_eq!(file.status, FileStatus::Executed);
    // hash verification recorded the content hash
    assert!(file.sha1.is_some());

    // resume: a second run skips the verified file
    let again = run_execute(&db, &settings, Arc::new(NoopTagWriter), &events, cancel())
        .await
        .unwrap();
    assert_eq!(again.skipped, 1);
    assert_eq!(again.processed, 0);
}

#[tokio::test]
async fn execute_size_mismatch_marks_error() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    let db = Db::open_memory().await.unwrap();
    let events = EventSink::disabled();

    let src_file = src.path().join("take1.mp3");
    std::fs::write(&src_file, b"actual bytes").unwrap();

    // recorded size disagrees with what lands on disk
    let id = seed_file(&db, &src_file, 9_999, 100).await;
    seed_meta(&db, id, basic_meta("mp3", "Artist", "Song", 120_000)).await;

    let settings = settings(src.path(), dst.path());
    run_cluster(&db).await.unwrap();
    run_plan(&db, &settings, &events).await.unwrap();

    let outcome = run_execute(&db, &settings, Arc::new(NoopTagWriter), &events, cancel())
        .await
        .unwrap();
    assert_eq!(outcome.failed, 1);

    let execution = ExecutionTable::get(db.pool(), id).await.unwrap().unwrap();
    assert!(!execution.verify_ok);
    assert!(execution.error.is_some());

    let file = FileTable::get(db.pool(), id).await.unwrap().unwrap();
    assert_eq!(file.status, FileStatus::Error);
}

#[tokio::test]
async fn execute_dry_run_touches_nothing() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    let db = Db::open_memory().await.unwrap();
    let events = EventSink::disabled();

    let src_file = src.path().join("take1.mp3");
    let body = b"bytes";
    std::fs::write(&src_file, body).unwrap();

    let id = seed_file(&db, &src_file, body.len() as i64, 100).await;
    seed_meta(&db, id, basic_meta("mp3", "Artist", "Song", 120_000)).await;

    let mut settings = settings(src.path(), dst.path());
    settings.dry_run = true;

    run_cluster(&db).await.unwrap();
    run_plan(&db, &settings, &events).await.unwrap();
    let outcome = run_execute(&db, &settings, Arc::new(NoopTagWriter), &events, cancel())
        .await
        .unwrap();
    assert_eq!(outcome.succeeded, 1);

    // no destination file exists, but the execution is recorded
    let plan = PlanTable::get(db.pool(), id).await.unwrap().unwrap();
    assert!(!Path::new(&plan.dest_path).exists());

    let execution = ExecutionTable::get(db.pool(), id).await.unwrap().unwrap();
    assert!(execution.verify_ok);
}

#[tokio::test]
async fn execute_hardlink_mode() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    let db = Db::open_memory().await.unwrap();
    let events = EventSink::disabled();

    let src_file = src.path().join("take1.flac");
    let body = b"link me";
    std::fs::write(&src_file, body).unwrap();

    let id = seed_file(&db, &src_file, body.len() as i64, 100).await;
    seed_meta(&db, id, basic_meta("flac", "Artist", "Song", 120_000)).await;

    let mut settings = settings(src.path(), dst.path());
    settings.mode = PlanAction::Hardlink;

    run_cluster(&db).await.unwrap();
    run_plan(&db, &settings, &events).await.unwrap();
    let outcome = run_execute(&db, &settings, Arc::new(NoopTagWriter), &events, cancel())
        .await
        .unwrap();
    assert_eq!(outcome.succeeded, 1);

    let plan = PlanTable::get(db.pool(), id).await.unwrap().unwrap();
    assert_eq!(std::fs::read(&plan.dest_path).unwrap(), body);
    // source untouched
    assert_eq!(std::fs::read(&src_file).unwrap(), body);
}

#[tokio::test]
async fn move_mode_removes_source_after_verify() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    let db = Db::open_memory().await.unwrap();
    let events = EventSink::disabled();

    let src_file = src.path().join("take1.mp3");
    let body = b"move these bytes";
    std::fs::write(&src_file, body).unwrap();

    let id = seed_file(&db, &src_file, body.len() as i64, 100).await;
    seed_meta(&db, id, basic_meta("mp3", "Artist", "Song", 120_000)).await;

    let mut settings = settings(src.path(), dst.path());
    settings.mode = PlanAction::Move;

    run_cluster(&db).await.unwrap();
    run_plan(&db, &settings, &events).await.unwrap();
    let outcome = run_execute(&db, &settings, Arc::new(NoopTagWriter), &events, cancel())
        .await
        .unwrap();
    assert_eq!(outcome.succeeded, 1);

    let plan = PlanTable::get(db.pool(), id).await.unwrap().unwrap();
    assert_eq!(std::fs::read(&plan.dest_path).unwrap(), body);
    assert!(!src_file.exists());
}
