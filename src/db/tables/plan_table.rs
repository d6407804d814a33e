//! Plan table operations

use anyhow::Result;
use sqlx::{FromRow, SqlitePool};

use crate::models::{Plan, PlanAction};

#[derive(Debug, FromRow)]
struct PlanRow {
    file_id: i64,
    action: String,
    dest_path: String,
    reason: String,
    created_at: i64,
}

impl PlanRow {
    fn into_plan(self) -> Plan {
        Plan {
            file_id: self.file_id,
            action: PlanAction::from_str(&self.action).unwrap_or(PlanAction::Skip),
            dest_path: self.dest_path,
            reason: self.reason,
            created_at: self.created_at,
        }
    }
}

/// Plan table operations
pub struct PlanTable;

impl PlanTable {
    /// Insert or replace a plan row
    pub async fn upsert(pool: &SqlitePool, plan: &Plan) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO plans (file_id, action, dest_path, reason, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(plan.file_id)
        .bind(plan.action.as_str())
        .bind(&plan.dest_path)
        .bind(&plan.reason)
        .bind(plan.created_at)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Insert many plans in one transaction
    pub async fn upsert_many(pool: &SqlitePool, plans: &[Plan]) -> Result<()> {
        let mut tx = pool.begin().await?;

        for plan in plans {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO plans (file_id, action, dest_path, reason, created_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(plan.file_id)
            .bind(plan.action.as_str())
            .bind(&plan.dest_path)
            .bind(&plan.reason)
            .bind(plan.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    /// Get the plan for a file
    pub async fn get(pool: &SqlitePool, file_id: i64) -> Result<Option<Plan>> {
        let row: Option<PlanRow> = sqlx::query_as("SELECT * FROM plans WHERE file_id = ?")
            .bind(file_id)
            .fetch_optional(pool)
            .await?;

        Ok(row.map(|r| r.into_plan()))
    }

    /// All plans, ordered by file id
    pub async fn all(pool: &SqlitePool) -> Result<Vec<Plan>> {
        let rows: Vec<PlanRow> = sqlx::query_as("SELECT * FROM plans ORDER BY file_id")
            .fetch_all(pool)
            .await?;

        Ok(rows.into_iter().map(|r| r.into_plan()).collect())
    }

    /// All non-skip plans, ordered by file id
    pub async fn non_skip(pool: &SqlitePool) -> Result<Vec<Plan>> {
        let rows: Vec<PlanRow> =
            sqlx::query_as("SELECT * FROM plans WHERE action != 'skip' ORDER BY file_id")
                .fetch_all(pool)
                .await?;

        Ok(rows.into_iter().map(|r| r.into_plan()).collect())
    }

    /// Destination paths claimed by more than one non-skip plan
    pub async fn colliding_dest_paths(pool: &SqlitePool) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT dest_path FROM plans
            WHERE action != 'skip'
            GROUP BY dest_path HAVING COUNT(*) > 1
            "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    /// Non-skip plans targeting one destination path
    pub async fn non_skip_for_dest(pool: &SqlitePool, dest_path: &str) -> Result<Vec<Plan>> {
        let rows: Vec<PlanRow> = sqlx::query_as(
            "SELECT * FROM plans WHERE action != 'skip' AND dest_path = ? ORDER BY file_id",
        )
        .bind(dest_path)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_plan()).collect())
    }

    /// Demote a plan to skip, recording why
    pub async fn rewrite_to_skip(pool: &SqlitePool, file_id: i64, reason: &str) -> Result<()> {
        sqlx::query("UPDATE plans SET action = 'skip', dest_path = '', reason = ? WHERE file_id = ?")
            .bind(reason)
            .bind(file_id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Count plans per action
    pub async fn count_by_action(pool: &SqlitePool, action: PlanAction) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM plans WHERE action = ?")
            .bind(action.as_str())
            .fetch_one(pool)
            .await?;

        Ok(row.0)
    }

    /// Drop all plans; planning always starts from a clean slate
    pub async fn clear_all(pool: &SqlitePool) -> Result<()> {
        sqlx::query("DELETE FROM plans").execute(pool).await?;

        Ok(())
    }
}
