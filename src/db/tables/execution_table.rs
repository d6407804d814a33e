//! Execution table operations

use anyhow::Result;
use sqlx::{FromRow, SqlitePool};

use crate::models::Execution;

#[derive(Debug, FromRow)]
struct ExecutionRow {
    file_id: i64,
    started_at: i64,
    completed_at: i64,
    bytes_written: i64,
    verify_ok: i32,
    error: Option<String>,
}

impl ExecutionRow {
    fn into_execution(self) -> Execution {
        Execution {
            file_id: self.file_id,
            started_at: self.started_at,
            completed_at: self.completed_at,
            bytes_written: self.bytes_written,
            verify_ok: self.verify_ok != 0,
            error: self.error,
        }
    }
}

/// Execution table operations
pub struct ExecutionTable;

impl ExecutionTable {
    /// Insert or replace the execution record for a file
    pub async fn upsert(pool: &SqlitePool, execution: &Execution) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO executions (
                file_id, started_at, completed_at, bytes_written, verify_ok, error
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(execution.file_id)
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .bind(execution.bytes_written)
        .bind(execution.verify_ok as i32)
        .bind(&execution.error)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Get the execution record for a file
    pub async fn get(pool: &SqlitePool, file_id: i64) -> Result<Option<Execution>> {
        let row: Option<ExecutionRow> =
            sqlx::query_as("SELECT * FROM executions WHERE file_id = ?")
                .bind(file_id)
                .fetch_optional(pool)
                .await?;

        Ok(row.map(|r| r.into_execution()))
    }

    /// True when the file already has a verified-ok execution
    pub async fn is_verified(pool: &SqlitePool, file_id: i64) -> Result<bool> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM executions WHERE file_id = ? AND verify_ok = 1",
        )
        .bind(file_id)
        .fetch_one(pool)
        .await?;

        Ok(row.0 > 0)
    }

    /// All execution records
    pub async fn all(pool: &SqlitePool) -> Result<Vec<Execution>> {
        let rows: Vec<ExecutionRow> = sqlx::query_as("SELECT * FROM executions ORDER BY file_id")
            .fetch_all(pool)
            .await?;

        Ok(rows.into_iter().map(|r| r.into_execution()).collect())
    }

    /// Drop all execution records (e.g. wiping a dry run before a real one)
    pub async fn clear_all(pool: &SqlitePool) -> Result<()> {
        sqlx::query("DELETE FROM executions").execute(pool).await?;

        Ok(())
    }
}
