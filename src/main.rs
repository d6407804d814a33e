//! TuneSweep - deduplicate and reorganize messy music libraries
//!
//! One binary, five subcommands, one state store. Each stage reads
//! what earlier stages wrote and can be re-run or resumed at will.

use std::collections::HashSet;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use tunesweep::config::{default_extensions, Settings};
use tunesweep::core::probe::{ensure_probe_available, Ffprobe};
use tunesweep::core::tagwriter::{FfmpegTagWriter, NoopTagWriter, TagWriter};
use tunesweep::core::{run_cluster, run_execute, run_meta, run_plan, run_scan};
use tunesweep::db::{Db, FileTable};
use tunesweep::models::{FileStatus, PlanAction, VerifyMode};
use tunesweep::utils::events::EventSink;
use tunesweep::utils::retry::RetryPolicy;

/// TuneSweep - deduplicate and reorganize messy music libraries
#[derive(Parser, Debug)]
#[command(name = "tunesweep")]
#[command(version = "0.3.0")]
#[command(about = "Deduplicate and reorganize messy music libraries")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Source library root
    #[arg(long, global = true)]
    src: Option<PathBuf>,

    /// Destination root
    #[arg(long, global = true)]
    dst: Option<PathBuf>,

    /// State store path
    #[arg(long, global = true, default_value = "tunesweep.db")]
    db: PathBuf,

    /// Materialization mode: copy, move, hardlink or symlink
    #[arg(long, global = true, default_value = "copy")]
    mode: String,

    /// Worker pool size per stage
    #[arg(long, global = true, default_value_t = 4)]
    concurrency: usize,

    /// Verification mode: none, size or hash
    #[arg(long, global = true, default_value = "size")]
    verify: String,

    /// Iterate plans without touching the filesystem
    #[arg(long, global = true)]
    dry_run: bool,

    /// Stamp enriched tags onto copied/moved outputs
    #[arg(long, global = true)]
    write_tags: bool,

    /// Copy chunk size in bytes
    #[arg(long, global = true, default_value_t = 128 * 1024)]
    buffer_size: usize,

    /// Max attempts for transient destination I/O
    #[arg(long, global = true, default_value_t = 1)]
    retry_max: u32,

    /// Comma-separated audio extensions overriding the default set
    #[arg(long, global = true)]
    extensions: Option<String>,

    /// Do not follow symlinks while scanning
    #[arg(long, global = true)]
    no_follow_symlinks: bool,

    /// Disable sibling-directory enrichment
    #[arg(long, global = true)]
    no_siblings: bool,

    /// Relaxed fsync and a larger cache for stores on network mounts
    #[arg(long, global = true)]
    network_optimized: bool,

    /// Base URL of the canonical artist name service
    #[arg(long, global = true)]
    canonical_url: Option<String>,

    /// JSON-lines event log path
    #[arg(long, global = true)]
    events: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Discover audio files under the source root
    Scan,
    /// Extract, enrich and clean metadata
    Meta,
    /// Group files that are the same recording
    Cluster,
    /// Score clusters, pick winners, compute destinations
    Plan,
    /// Materialize winners at the destination
    Execute,
    /// Run all five stages in order
    RunAll,
}

fn build_settings(args: &Args) -> Result<Settings> {
    let mode = PlanAction::from_str(&args.mode)
        .filter(|m| *m != PlanAction::Skip)
        .with_context(|| format!("invalid mode: {}", args.mode))?;
    let verify = VerifyMode::from_str(&args.verify)
        .with_context(|| format!("invalid verify mode: {}", args.verify))?;

    let extensions: HashSet<String> = match &args.extensions {
        Some(csv) => csv
            .split(',')
            .map(|e| e.trim().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect(),
        None => default_extensions(),
    };

    let needs_src = matches!(
        args.command,
        Command::Scan | Command::Meta | Command::RunAll
    );
    if needs_src && args.src.is_none() {
        bail!("--src is required for this command");
    }

    let needs_dst = matches!(
        args.command,
        Command::Plan | Command::Execute | Command::RunAll
    );
    if needs_dst && args.dst.is_none() {
        bail!("--dst is required for this command");
    }

    Ok(Settings {
        src_root: args.src.clone().unwrap_or_default(),
        dest_root: args.dst.clone().unwrap_or_default(),
        db_path: args.db.clone(),
        mode,
        concurrency: args.concurrency.max(1),
        verify,
        dry_run: args.dry_run,
        write_tags: args.write_tags,
        buffer_size: args.buffer_size,
        retry: RetryPolicy::with_max_attempts(args.retry_max),
        extensions,
        follow_symlinks: !args.no_follow_symlinks,
        sibling_enrichment: !args.no_siblings,
        network_optimized: args.network_optimized,
        canonical_url: args.canonical_url.clone(),
        events_path: args.events.clone(),
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // filter noisy audio-parsing crates down to errors
    let log_level = if args.debug { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::new(format!(
        "{},lofty=error,sqlx=warn,reqwest=warn",
        log_level
    ));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("fatal: {:#}", e);
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let settings = build_settings(&args)?;

    let db = Db::open(&settings.db_path, settings.network_optimized)
        .await
        .context("cannot open state store")?;

    let events = match &settings.events_path {
        Some(path) => EventSink::open(path)?,
        None => EventSink::disabled(),
    };

    // cancellation: first Ctrl-C drains gracefully
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("cancellation requested, finishing in-flight files...");
                cancel.store(true, Ordering::Relaxed);
            }
        });
    }

    match args.command {
        Command::Scan => {
            run_scan(&db, &settings, &events).await?;
        }
        Command::Meta => {
            run_meta_stage(&db, &settings, &events, Arc::clone(&cancel)).await?;
        }
        Command::Cluster => {
            run_cluster(&db).await?;
        }
        Command::Plan => {
            run_plan(&db, &settings, &events).await?;
        }
        Command::Execute => {
            run_execute_stage(&db, &settings, &events, Arc::clone(&cancel)).await?;
        }
        Command::RunAll => {
            run_scan(&db, &settings, &events).await?;
            run_meta_stage(&db, &settings, &events, Arc::clone(&cancel)).await?;
            if !cancel.load(Ordering::Relaxed) {
                run_cluster(&db).await?;
                run_plan(&db, &settings, &events).await?;
                run_execute_stage(&db, &settings, &events, Arc::clone(&cancel)).await?;
            }
        }
    }

    // exit 2 when files remain in error status, so operators notice
    // partial results without digging through logs
    let errors = FileTable::count_by_status(db.pool(), FileStatus::Error).await?;
    db.close().await;

    if errors > 0 {
        tracing::warn!("{} files remain in error status; re-run to retry", errors);
        return Ok(ExitCode::from(2));
    }

    Ok(ExitCode::SUCCESS)
}

async fn run_meta_stage(
    db: &Db,
    settings: &Settings,
    events: &EventSink,
    cancel: Arc<AtomicBool>,
) -> Result<()> {
    if let Err(e) = ensure_probe_available() {
        tracing::warn!("ffprobe unavailable: {}. Files without readable tags will fail.", e);
    }

    let probe = Arc::new(Ffprobe::new());
    run_meta(db, settings, probe, events, cancel).await?;
    Ok(())
}

async fn run_execute_stage(
    db: &Db,
    settings: &Settings,
    events: &EventSink,
    cancel: Arc<AtomicBool>,
) -> Result<()> {
    let tag_writer: Arc<dyn TagWriter> = if settings.write_tags {
        if let Err(e) = ensure_probe_available() {
            tracing::warn!("ffmpeg unavailable: {}. Tag stamping will be skipped.", e);
        }
        Arc::new(FfmpegTagWriter::new())
    } else {
        Arc::new(NoopTagWriter)
    };

    run_execute(db, settings, tag_writer, events, cancel).await?;
    Ok(())
}
