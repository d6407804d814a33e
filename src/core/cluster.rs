//! Clustering: group files that are the same recording
//!
//! The cluster key is a pipe-delimited fingerprint of normalized
//! artist and title, the detected recording version, a 3-second
//! duration bucket and the disc number. Files sharing a key are
//! duplicates as far as planning is concerned.
//!
//! Clustering walks meta-ok files in id order and checkpoints the last
//! processed id, so an interrupted run resumes where it stopped
//! without re-inserting members.

use std::path::Path;

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use crate::db::{ClusterTable, Db, FileTable, MetadataTable};
use crate::models::{Cluster, FileStatus, TrackMeta};
use crate::utils::dates::now_unix;
use crate::utils::normalize::{detect_version_type, duration_bucket, norm_artist, norm_title};

/// Checkpoint after this many files
const CHECKPOINT_INTERVAL: usize = 100;

/// Stage result counters
#[derive(Debug, Default, Clone)]
pub struct ClusterOutcome {
    pub processed: u64,
    pub members_added: u64,
    pub clusters_total: i64,
}

/// Build the fingerprint key and human hint for one file
pub fn build_cluster_key(meta: &TrackMeta, src_path: &Path) -> (String, String) {
    let artist = norm_artist(&meta.tag_artist);
    let title = norm_title(&meta.tag_title, src_path);
    // the version keywords live in the original title, before any
    // normalization strips the brackets they sit in
    let version = detect_version_type(&meta.tag_title);
    let bucket = duration_bucket(meta.duration_ms);
    let disc = meta.tag_disc.max(0);

    let key = format!(
        "{}|{}|{}|{}|disc{}",
        artist,
        title,
        version.as_str(),
        bucket,
        disc
    );
    let hint = format!("{} - {}", artist, title);

    (key, hint)
}

/// True when a file was refreshed after the existing clusters were built
///
/// The rebuild policy is coarse on purpose: any scan refresh newer than
/// the oldest clustered file invalidates the whole grouping.
pub async fn clusters_stale(pool: &SqlitePool) -> Result<bool> {
    let oldest_clustered = match ClusterTable::oldest_member_update_at(pool).await? {
        Some(t) => t,
        None => return Ok(false),
    };

    let newest_file = FileTable::newest_update_at(pool).await?;

    Ok(newest_file > oldest_clustered)
}

/// Run the clustering stage
pub async fn run_cluster(db: &Db) -> Result<ClusterOutcome> {
    let pool = db.pool();

    if clusters_stale(pool).await? {
        tracing::info!("clusters are stale, clearing and rebuilding");
        ClusterTable::clear_all(pool).await?;
    }

    let checkpoint = ClusterTable::get_progress(pool).await?.unwrap_or(0);
    if checkpoint > 0 {
        tracing::info!("resuming clustering after file id {}", checkpoint);
    }

    let files = FileTable::get_by_status_after(pool, FileStatus::MetaOk, checkpoint).await?;

    let mut outcome = ClusterOutcome::default();
    let now = now_unix();

    for (i, file) in files.iter().enumerate() {
        let meta = MetadataTable::get(pool, file.id)
            .await?
            .with_context(|| format!("meta_ok file {} has no metadata row", file.id))?;

        let (key, hint) = build_cluster_key(&meta, Path::new(&file.src_path));

        ClusterTable::insert_cluster(
            pool,
            &Cluster {
                cluster_key: key.clone(),
                hint,
                created_at: now,
            },
        )
        .await?;
        ClusterTable::insert_member(pool, &key, file.id).await?;

        outcome.processed += 1;
        outcome.members_added += 1;

        if (i + 1) % CHECKPOINT_INTERVAL == 0 {
            ClusterTable::set_progress(pool, file.id).await?;
        }
    }

    // a clean finish clears the checkpoint; the next run starts fresh
    ClusterTable::clear_progress(pool).await?;

    outcome.clusters_total = ClusterTable::count(pool).await?;
    tracing::info!(
        "cluster: {} files grouped into {} clusters",
        outcome.processed,
        outcome.clusters_total
    );

    Ok(outcome)
}
