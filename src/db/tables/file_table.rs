//! File table operations

use anyhow::Result;
use sqlx::{FromRow, SqlitePool};

use crate::models::{FileRecord, FileStatus};

/// Database row for the files table
#[derive(Debug, FromRow)]
struct FileRow {
    id: i64,
    file_key: String,
    src_path: String,
    size_bytes: i64,
    mtime_unix: i64,
    sha1: Option<String>,
    status: String,
    last_error: Option<String>,
    created_at: i64,
    last_update_at: i64,
}

impl FileRow {
    fn into_record(self) -> FileRecord {
        FileRecord {
            id: self.id,
            file_key: self.file_key,
            src_path: self.src_path,
            size_bytes: self.size_bytes,
            mtime_unix: self.mtime_unix,
            sha1: self.sha1,
            status: FileStatus::from_str(&self.status).unwrap_or(FileStatus::Error),
            last_error: self.last_error,
            created_at: self.created_at,
            last_update_at: self.last_update_at,
        }
    }
}

/// Outcome of a scan upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Refreshed,
}

/// File table operations
pub struct FileTable;

impl FileTable {
    /// Insert a discovered file, or refresh path/size/mtime when the
    /// file_key already exists. The id and status are preserved on
    /// refresh; `last_update_at` is always bumped.
    pub async fn upsert(pool: &SqlitePool, record: &FileRecord) -> Result<UpsertOutcome> {
        let existing: Option<(i64,)> = sqlx::query_as("SELECT id FROM files WHERE file_key = ?")
            .bind(&record.file_key)
            .fetch_optional(pool)
            .await?;

        match existing {
            Some(_) => {
                sqlx::query(
                    r#"
                    UPDATE files
                    SET src_path = ?, size_bytes = ?, mtime_unix = ?, last_update_at = ?
                    WHERE file_key = ?
                    "#,
                )
                .bind(&record.src_path)
                .bind(record.size_bytes)
                .bind(record.mtime_unix)
                .bind(record.last_update_at)
                .bind(&record.file_key)
                .execute(pool)
                .await?;
                Ok(UpsertOutcome::Refreshed)
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO files (
                        file_key, src_path, size_bytes, mtime_unix, sha1,
                        status, last_error, created_at, last_update_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&record.file_key)
                .bind(&record.src_path)
                .bind(record.size_bytes)
                .bind(record.mtime_unix)
                .bind(&record.sha1)
                .bind(record.status.as_str())
                .bind(&record.last_error)
                .bind(record.created_at)
                .bind(record.last_update_at)
                .execute(pool)
                .await?;
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    /// Get a file by its stable key
    pub async fn get_by_key(pool: &SqlitePool, file_key: &str) -> Result<Option<FileRecord>> {
        let row: Option<FileRow> = sqlx::query_as("SELECT * FROM files WHERE file_key = ?")
            .bind(file_key)
            .fetch_optional(pool)
            .await?;

        Ok(row.map(|r| r.into_record()))
    }

    /// Get a file by id
    pub async fn get(pool: &SqlitePool, id: i64) -> Result<Option<FileRecord>> {
        let row: Option<FileRow> = sqlx::query_as("SELECT * FROM files WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(row.map(|r| r.into_record()))
    }

    /// Get all files with the given status, ordered by id
    pub async fn get_by_status(pool: &SqlitePool, status: FileStatus) -> Result<Vec<FileRecord>> {
        let rows: Vec<FileRow> =
            sqlx::query_as("SELECT * FROM files WHERE status = ? ORDER BY id")
                .bind(status.as_str())
                .fetch_all(pool)
                .await?;

        Ok(rows.into_iter().map(|r| r.into_record()).collect())
    }

    /// Get files with the given status whose id is past the checkpoint
    pub async fn get_by_status_after(
        pool: &SqlitePool,
        status: FileStatus,
        after_id: i64,
    ) -> Result<Vec<FileRecord>> {
        let rows: Vec<FileRow> =
            sqlx::query_as("SELECT * FROM files WHERE status = ? AND id > ? ORDER BY id")
                .bind(status.as_str())
                .bind(after_id)
                .fetch_all(pool)
                .await?;

        Ok(rows.into_iter().map(|r| r.into_record()).collect())
    }

    /// Files the metadata stage still owes work: freshly discovered
    /// ones, plus error files whose extraction never produced a row
    /// (execution failures keep their metadata and are not re-probed)
    pub async fn needing_meta(pool: &SqlitePool) -> Result<Vec<FileRecord>> {
        let rows: Vec<FileRow> = sqlx::query_as(
            r#"
            SELECT * FROM files
            WHERE status = 'discovered'
               OR (status = 'error' AND id NOT IN (SELECT file_id FROM metadata))
            ORDER BY id
            "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_record()).collect())
    }

    /// Advance a file's status and clear any stale error text
    pub async fn set_status(pool: &SqlitePool, id: i64, status: FileStatus, now: i64) -> Result<()> {
        sqlx::query(
            "UPDATE files SET status = ?, last_error = NULL, last_update_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Mark a file failed, recording the error text
    pub async fn set_error(pool: &SqlitePool, id: i64, error: &str, now: i64) -> Result<()> {
        sqlx::query(
            "UPDATE files SET status = 'error', last_error = ?, last_update_at = ? WHERE id = ?",
        )
        .bind(error)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Record a computed content hash
    pub async fn set_sha1(pool: &SqlitePool, id: i64, sha1: &str) -> Result<()> {
        sqlx::query("UPDATE files SET sha1 = ? WHERE id = ?")
            .bind(sha1)
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Count files per status value
    pub async fn count_by_status(pool: &SqlitePool, status: FileStatus) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM files WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(pool)
            .await?;

        Ok(row.0)
    }

    /// Total file count
    pub async fn count(pool: &SqlitePool) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM files")
            .fetch_one(pool)
            .await?;

        Ok(row.0)
    }

    /// Newest last_update_at across all files (0 when empty)
    pub async fn newest_update_at(pool: &SqlitePool) -> Result<i64> {
        let row: (Option<i64>,) = sqlx::query_as("SELECT MAX(last_update_at) FROM files")
            .fetch_one(pool)
            .await?;

        Ok(row.0.unwrap_or(0))
    }

    /// File keys currently in error status, for operator dumps
    pub async fn error_file_keys(pool: &SqlitePool) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT file_key FROM files WHERE status = 'error' ORDER BY id")
                .fetch_all(pool)
                .await?;

        Ok(rows.into_iter().map(|r| r.0).collect())
    }
}
