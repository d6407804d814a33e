//! Execute stage: materialize winners at the destination
//!
//! Every non-skip plan becomes a filesystem action performed by a
//! worker pool. Copies stage through `.part` files and rename into
//! place, moves prefer a same-filesystem rename and fall back to
//! copy + verify + remove-source, links ensure their parent exists
//! first. Results are verified per the configured mode and recorded
//! per file; a failure marks the file `error` and the stage moves on.
//!
//! Resume: a file whose execution already verified ok is skipped and
//! reported with the -1 bytes sentinel. Failed executions run again.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use crate::config::{Settings, TAG_WRITABLE_EXTENSIONS};
use crate::core::tagwriter::{tag_pairs, TagWriter};
use crate::db::{Db, ExecutionTable, FileTable, MetadataTable, PlanTable};
use crate::error::SweepError;
use crate::models::{Execution, FileRecord, FileStatus, Plan, PlanAction, TrackMeta, VerifyMode};
use crate::utils::dates::now_unix;
use crate::utils::events::{Event, EventSink};
use crate::utils::fileops;
use crate::utils::progress::{Counters, ProgressReporter};

/// Stage result counters
#[derive(Debug, Default, Clone)]
pub struct ExecuteOutcome {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    pub bytes_written: i64,
}

struct WorkItem {
    plan: Plan,
    file: FileRecord,
    meta: TrackMeta,
}

struct ActionResult {
    file_id: i64,
    file_key: String,
    src_path: String,
    dest_path: String,
    action: PlanAction,
    started_at: i64,
    outcome: Result<ActionSuccess, SweepError>,
}

struct ActionSuccess {
    bytes: i64,
    sha1: Option<String>,
}

/// Run the execute stage
pub async fn run_execute(
    db: &Db,
    settings: &Settings,
    tag_writer: Arc<dyn TagWriter>,
    events: &EventSink,
    cancel: Arc<AtomicBool>,
) -> Result<ExecuteOutcome> {
    let pool = db.pool();

    // destination must be usable before any worker starts
    if !settings.dry_run {
        std::fs::create_dir_all(&settings.dest_root).with_context(|| {
            format!(
                "destination root not writable: {}",
                settings.dest_root.display()
            )
        })?;
    }

    let plans = PlanTable::non_skip(pool).await?;
    let total = plans.len() as u64;
    let mut outcome = ExecuteOutcome::default();

    if plans.is_empty() {
        tracing::info!("execute: nothing to do");
        return Ok(outcome);
    }

    let counters = Counters::new();
    let reporter = ProgressReporter::start("execute", counters.clone(), total);
    let now = now_unix();

    // resolve work up front; already-verified files are reported as
    // skipped with the -1 bytes sentinel
    let mut work = Vec::new();
    for plan in plans {
        let file = FileTable::get(pool, plan.file_id)
            .await?
            .with_context(|| format!("plan for missing file {}", plan.file_id))?;

        if ExecutionTable::is_verified(pool, plan.file_id).await? {
            events.emit(
                &Event::new("execute", &file.file_key, &file.src_path)
                    .dest(&plan.dest_path)
                    .action(plan.action.as_str())
                    .bytes(-1),
            );
            outcome.skipped += 1;
            counters.add_skipped();
            continue;
        }

        let meta = MetadataTable::get(pool, plan.file_id)
            .await?
            .unwrap_or_else(|| TrackMeta::new(plan.file_id));

        work.push(WorkItem { plan, file, meta });
    }

    if settings.dry_run {
        // iterate the plans without touching the filesystem; the
        // executions are still recorded so resume semantics hold
        for item in work {
            ExecutionTable::upsert(
                pool,
                &Execution {
                    file_id: item.file.id,
                    started_at: now,
                    completed_at: now,
                    bytes_written: 0,
                    verify_ok: true,
                    error: None,
                },
            )
            .await?;
            events.emit(
                &Event::new("execute", &item.file.file_key, &item.file.src_path)
                    .dest(&item.plan.dest_path)
                    .action(item.plan.action.as_str())
                    .bytes(0),
            );
            outcome.processed += 1;
            outcome.succeeded += 1;
        }
        reporter.stop();
        tracing::info!("execute (dry run): {} plans iterated", outcome.processed);
        return Ok(outcome);
    }

    let concurrency = settings.concurrency.max(1);
    let (work_tx, work_rx) = mpsc::channel::<WorkItem>(concurrency * 2);
    let (result_tx, mut result_rx) = mpsc::channel::<ActionResult>(concurrency * 2);
    let work_rx = Arc::new(tokio::sync::Mutex::new(work_rx));

    let mut workers = Vec::with_capacity(concurrency);
    for _ in 0..concurrency {
        let work_rx = Arc::clone(&work_rx);
        let result_tx = result_tx.clone();
        let cancel = Arc::clone(&cancel);
        let settings = settings.clone();
        let tag_writer = Arc::clone(&tag_writer);

        workers.push(tokio::spawn(async move {
            loop {
                let item = {
                    let mut rx = work_rx.lock().await;
                    match rx.recv().await {
                        Some(item) => item,
                        None => break,
                    }
                };

                if cancel.load(Ordering::Relaxed) {
                    break;
                }

                let started_at = now_unix();
                let result = ActionResult {
                    file_id: item.file.id,
                    file_key: item.file.file_key.clone(),
                    src_path: item.file.src_path.clone(),
                    dest_path: item.plan.dest_path.clone(),
                    action: item.plan.action,
                    started_at,
                    outcome: {
                        let settings = settings.clone();
                        let cancel = Arc::clone(&cancel);
                        let tag_writer = Arc::clone(&tag_writer);
                        tokio::task::spawn_blocking(move || {
                            perform_action(&item, &settings, tag_writer.as_ref(), &cancel)
                        })
                        .await
                        .unwrap_or_else(|e| {
                            Err(SweepError::Unreadable(
                                PathBuf::new(),
                                format!("worker panicked: {}", e),
                            ))
                        })
                    },
                };

                if result_tx.send(result).await.is_err() {
                    break;
                }
            }
        }));
    }
    drop(result_tx);

    let producer = {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            for item in work {
                if cancel.load(Ordering::Relaxed) {
                    break;
                }
                if work_tx.send(item).await.is_err() {
                    break;
                }
            }
        })
    };

    // driver side: the only writer
    while let Some(result) = result_rx.recv().await {
        let completed_at = now_unix();

        match result.outcome {
            Ok(success) => {
                ExecutionTable::upsert(
                    pool,
                    &Execution {
                        file_id: result.file_id,
                        started_at: result.started_at,
                        completed_at,
                        bytes_written: success.bytes,
                        verify_ok: true,
                        error: None,
                    },
                )
                .await?;
                if let Some(sha1) = &success.sha1 {
                    FileTable::set_sha1(pool, result.file_id, sha1).await?;
                }
                FileTable::set_status(pool, result.file_id, FileStatus::Executed, completed_at)
                    .await?;

                events.emit(
                    &Event::new("execute", &result.file_key, &result.src_path)
                        .dest(&result.dest_path)
                        .action(result.action.as_str())
                        .bytes(success.bytes)
                        .duration_ms((completed_at - result.started_at) * 1000),
                );
                outcome.processed += 1;
                outcome.succeeded += 1;
                outcome.bytes_written += success.bytes;
                counters.add_processed();
                counters.add_succeeded();
                counters.add_bytes(success.bytes);
            }
            Err(SweepError::Canceled) => {
                // no record for the in-flight file; the next run
                // picks it up untouched
                tracing::info!("execution canceled at {}", result.src_path);
            }
            Err(err) => {
                let error_text = err.to_string();
                let record = ExecutionTable::upsert(
                    pool,
                    &Execution {
                        file_id: result.file_id,
                        started_at: result.started_at,
                        completed_at,
                        bytes_written: 0,
                        verify_ok: false,
                        error: Some(error_text.clone()),
                    },
                )
                .await;
                if let Err(e) = record {
                    tracing::warn!("failed to record execution error: {}", e);
                }
                if let Err(e) =
                    FileTable::set_error(pool, result.file_id, &error_text, completed_at).await
                {
                    tracing::warn!("failed to record file error: {}", e);
                }

                events.emit(
                    &Event::new("execute", &result.file_key, &result.src_path)
                        .dest(&result.dest_path)
                        .action(result.action.as_str())
                        .error(&error_text),
                );
                outcome.processed += 1;
                outcome.failed += 1;
                counters.add_processed();
                counters.add_failed();
            }
        }
    }

    producer.await?;
    for worker in workers {
        worker.await?;
    }
    reporter.stop();

    tracing::info!(
        "execute: {} processed, {} ok, {} failed, {} skipped, {} bytes",
        outcome.processed,
        outcome.succeeded,
        outcome.failed,
        outcome.skipped,
        outcome.bytes_written
    );

    Ok(outcome)
}

/// Perform one plan's action on a blocking thread
fn perform_action(
    item: &WorkItem,
    settings: &Settings,
    tag_writer: &dyn TagWriter,
    cancel: &AtomicBool,
) -> Result<ActionSuccess, SweepError> {
    let src = Path::new(&item.file.src_path);
    let dest = Path::new(&item.plan.dest_path);
    let policy = &settings.retry;

    let success = match item.plan.action {
        PlanAction::Copy => {
            let bytes =
                fileops::copy_with_staging(src, dest, settings.buffer_size, policy, cancel)?;
            let sha1 = verify(settings.verify, src, dest, item.file.size_bytes, policy)?;
            ActionSuccess {
                bytes: bytes as i64,
                sha1,
            }
        }
        PlanAction::Move => {
            if fileops::try_rename(src, dest, policy)? {
                // the source inode moved; size against the recorded
                // value is the strongest check still available
                if settings.verify != VerifyMode::None {
                    fileops::verify_size(dest, item.file.size_bytes, policy)?;
                }
                ActionSuccess {
                    bytes: 0,
                    sha1: None,
                }
            } else {
                // cross-filesystem: copy, verify, only then drop the source
                let bytes =
                    fileops::copy_with_staging(src, dest, settings.buffer_size, policy, cancel)?;
                let sha1 = match settings.verify {
                    VerifyMode::Hash => Some(fileops::verify_hash(src, dest)?),
                    _ => {
                        fileops::verify_size(dest, item.file.size_bytes, policy)?;
                        None
                    }
                };
                fileops::remove_source(policy, src)?;
                ActionSuccess {
                    bytes: bytes as i64,
                    sha1,
                }
            }
        }
        PlanAction::Hardlink => {
            // a hard link shares the inode; size equality holds by
            // definition, so no separate verification runs
            fileops::hardlink(src, dest, policy)?;
            ActionSuccess {
                bytes: 0,
                sha1: None,
            }
        }
        PlanAction::Symlink => {
            fileops::symlink(src, dest, policy)?;
            ActionSuccess {
                bytes: 0,
                sha1: None,
            }
        }
        PlanAction::Skip => ActionSuccess {
            bytes: 0,
            sha1: None,
        },
    };

    maybe_stamp_tags(item, settings, tag_writer, dest);

    Ok(success)
}

/// Post-action verification; hash mode returns the content hash
fn verify(
    mode: VerifyMode,
    src: &Path,
    dest: &Path,
    expected_size: i64,
    policy: &crate::utils::retry::RetryPolicy,
) -> Result<Option<String>, SweepError> {
    match mode {
        VerifyMode::None => Ok(None),
        VerifyMode::Size => {
            fileops::verify_size(dest, expected_size, policy)?;
            Ok(None)
        }
        VerifyMode::Hash => Ok(Some(fileops::verify_hash(src, dest)?)),
    }
}

/// Stamp enriched tags onto the output when configured; never fatal
fn maybe_stamp_tags(item: &WorkItem, settings: &Settings, tag_writer: &dyn TagWriter, dest: &Path) {
    if !settings.write_tags {
        return;
    }
    if !matches!(item.plan.action, PlanAction::Copy | PlanAction::Move) {
        return;
    }

    let writable = dest
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| TAG_WRITABLE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false);
    if !writable {
        return;
    }

    let pairs = tag_pairs(&item.meta);
    if let Err(e) = tag_writer.write_tags(dest, &pairs) {
        tracing::warn!("tag stamping failed for {}: {}", dest.display(), e);
    }
}
