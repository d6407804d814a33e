//! Scoring, winner selection and plan generation
//!
//! For every cluster this stage scores the members, flags one winner,
//! and writes a plan row per file: the winner gets the configured
//! action and a computed destination, the rest get skip plans naming
//! the winner. A final pass resolves destination collisions across
//! clusters so non-skip destinations end up unique.
//!
//! Prior plans are cleared up front, which makes the stage idempotent.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};

use crate::config::Settings;
use crate::core::pathgen::dest_path;
use crate::core::patterns::has_compilation_marker;
use crate::core::scoring::{pick_winner, quality_score};
use crate::db::{ClusterTable, Db, FileTable, MetadataTable, PlanTable};
use crate::models::{FileRecord, Plan, PlanAction, TrackMeta};
use crate::utils::dates::now_unix;
use crate::utils::events::{Event, EventSink};

/// Stage result counters
#[derive(Debug, Default, Clone)]
pub struct PlanOutcome {
    pub planned: u64,
    pub skipped: u64,
    pub collisions: u64,
}

/// Run the scoring + planning stage
pub async fn run_plan(db: &Db, settings: &Settings, events: &EventSink) -> Result<PlanOutcome> {
    let pool = db.pool();
    let now = now_unix();

    PlanTable::clear_all(pool).await?;

    let mut outcome = PlanOutcome::default();
    let cluster_keys = ClusterTable::all_keys(pool).await?;
    let mut pending: Vec<Plan> = Vec::new();

    for cluster_key in &cluster_keys {
        let members = ClusterTable::members(pool, cluster_key).await?;
        if members.is_empty() {
            continue;
        }

        // load each member's file and metadata, score it
        let mut scored: Vec<(f64, FileRecord)> = Vec::with_capacity(members.len());
        let mut metas: HashMap<i64, TrackMeta> = HashMap::with_capacity(members.len());

        for member in &members {
            let file = FileTable::get(pool, member.file_id)
                .await?
                .with_context(|| format!("cluster member {} has no file row", member.file_id))?;
            let meta = MetadataTable::get(pool, member.file_id)
                .await?
                .with_context(|| format!("cluster member {} has no metadata", member.file_id))?;

            let score = quality_score(&meta, file.size_bytes);
            ClusterTable::set_score(pool, cluster_key, member.file_id, score).await?;

            scored.push((score, file));
            metas.insert(member.file_id, meta);
        }

        let winner_idx = match pick_winner(&scored) {
            Some(idx) => idx,
            None => continue,
        };
        let (winner_score, winner_file) = &scored[winner_idx];
        ClusterTable::set_preferred(pool, cluster_key, winner_file.id).await?;

        let winner_meta = metas
            .get(&winner_file.id)
            .context("winner metadata vanished mid-plan")?;
        let src = Path::new(&winner_file.src_path);
        let compilation = is_real_compilation(db, winner_meta, &winner_file.src_path).await?;
        let dest = dest_path(&settings.dest_root, winner_meta, src, compilation);
        let dest_str = dest.to_string_lossy().to_string();

        pending.push(Plan {
            file_id: winner_file.id,
            action: settings.mode,
            dest_path: dest_str.clone(),
            reason: format!("cluster winner (score {:.1})", winner_score),
            created_at: now,
        });
        events.emit(
            &Event::new("plan", &winner_file.file_key, &winner_file.src_path)
                .dest(&dest_str)
                .action(settings.mode.as_str()),
        );
        outcome.planned += 1;

        for (i, (_, file)) in scored.iter().enumerate() {
            if i == winner_idx {
                continue;
            }
            pending.push(Plan {
                file_id: file.id,
                action: PlanAction::Skip,
                dest_path: String::new(),
                reason: format!("duplicate of file {} ({})", winner_file.id, winner_file.src_path),
                created_at: now,
            });
            events.emit(
                &Event::new("plan", &file.file_key, &file.src_path).action(PlanAction::Skip.as_str()),
            );
            outcome.skipped += 1;
        }
    }

    PlanTable::upsert_many(pool, &pending).await?;

    outcome.collisions = resolve_collisions(db).await?;
    outcome.planned = outcome.planned.saturating_sub(outcome.collisions);
    outcome.skipped += outcome.collisions;

    tracing::info!(
        "plan: {} planned, {} skipped ({} collision losers)",
        outcome.planned,
        outcome.skipped,
        outcome.collisions
    );

    Ok(outcome)
}

/// A compilation flag becomes the Various Artists layout only when the
/// album really spans at least three distinct track artists
async fn is_real_compilation(db: &Db, meta: &TrackMeta, src_path: &str) -> Result<bool> {
    let flagged = meta.tag_compilation || has_compilation_marker(src_path, &meta.tag_album);
    if !flagged || meta.tag_album.is_empty() {
        return Ok(false);
    }

    let distinct = MetadataTable::distinct_artists_for_album(db.pool(), &meta.tag_album).await?;
    Ok(distinct >= 3)
}

/// Rewrite all but the best plan per contested destination to skip
///
/// Returns the number of demoted plans. Destination uniqueness across
/// non-skip plans is the post-condition.
async fn resolve_collisions(db: &Db) -> Result<u64> {
    let pool = db.pool();
    let mut demoted = 0;

    for dest in PlanTable::colliding_dest_paths(pool).await? {
        let contenders = PlanTable::non_skip_for_dest(pool, &dest).await?;
        if contenders.len() < 2 {
            continue;
        }

        // highest cluster score keeps the path; file id breaks ties
        let mut ranked: Vec<(f64, i64)> = Vec::with_capacity(contenders.len());
        for plan in &contenders {
            let score = ClusterTable::member_for_file(pool, plan.file_id)
                .await?
                .map(|m| m.quality_score)
                .unwrap_or(0.0);
            ranked.push((score, plan.file_id));
        }
        ranked.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.cmp(&b.1))
        });

        let (_, winner_id) = ranked[0];
        for (_, loser_id) in &ranked[1..] {
            let reason = format!("path collision (winner: {} at {})", winner_id, dest);
            PlanTable::rewrite_to_skip(pool, *loser_id, &reason).await?;
            demoted += 1;
        }
    }

    Ok(demoted)
}
