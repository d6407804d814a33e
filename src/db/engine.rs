//! Database engine and connection management
//!
//! The store is a single SQLite file in WAL mode. Unlike a server
//! process there is no global engine: each run opens a `Db`, passes it
//! to the stages, and closes it at shutdown.

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use super::migrations::run_migrations;

/// Database handle owning the connection pool
#[derive(Debug, Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    /// Open (creating if missing) the state store at `path`
    ///
    /// `network_optimized` relaxes fsync to checkpoint-only and bumps
    /// the page cache to 64 MiB, for stores living on network mounts.
    pub async fn open(path: &Path, network_optimized: bool) -> Result<Self> {
        let mut options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .pragma("foreign_keys", "ON")
            .pragma("temp_store", "MEMORY");

        if network_optimized {
            options = options
                .synchronous(sqlx::sqlite::SqliteSynchronous::Off)
                // negative cache_size is KiB: 64 MiB
                .pragma("cache_size", "-65536");
        } else {
            options = options.synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .min_connections(1)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect_with(options)
            .await
            .context("Failed to open state store")?;

        let db = Db { pool };
        db.create_tables().await?;
        run_migrations(db.pool()).await?;

        Ok(db)
    }

    /// In-memory store for tests
    pub async fn open_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?
            .pragma("foreign_keys", "ON");

        // a single pinned connection: the database lives and dies
        // with it
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to open in-memory store")?;

        let db = Db { pool };
        db.create_tables().await?;
        run_migrations(db.pool()).await?;

        Ok(db)
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the pool; held for the process lifetime otherwise
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn create_tables(&self) -> Result<()> {
        // Files: unit of work, upserted by scan on file_key
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_key TEXT NOT NULL UNIQUE,
                src_path TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                mtime_unix INTEGER NOT NULL,
                sha1 TEXT,
                status TEXT NOT NULL DEFAULT 'discovered',
                last_error TEXT,
                created_at INTEGER NOT NULL,
                last_update_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_files_status ON files(status);
            CREATE INDEX IF NOT EXISTS idx_files_file_key ON files(file_key);
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Metadata: one row per file, probe merged with tags
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS metadata (
                file_id INTEGER PRIMARY KEY,
                format TEXT NOT NULL DEFAULT '',
                codec TEXT NOT NULL DEFAULT '',
                container TEXT NOT NULL DEFAULT '',
                duration_ms INTEGER NOT NULL DEFAULT 0,
                sample_rate INTEGER NOT NULL DEFAULT 0,
                bit_depth INTEGER NOT NULL DEFAULT 0,
                channels INTEGER NOT NULL DEFAULT 0,
                bitrate_kbps INTEGER NOT NULL DEFAULT 0,
                lossless INTEGER NOT NULL DEFAULT 0,
                tag_artist TEXT NOT NULL DEFAULT '',
                tag_album TEXT NOT NULL DEFAULT '',
                tag_title TEXT NOT NULL DEFAULT '',
                tag_albumartist TEXT NOT NULL DEFAULT '',
                tag_date TEXT NOT NULL DEFAULT '',
                tag_track INTEGER NOT NULL DEFAULT 0,
                tag_track_total INTEGER NOT NULL DEFAULT 0,
                tag_disc INTEGER NOT NULL DEFAULT 0,
                tag_disc_total INTEGER NOT NULL DEFAULT 0,
                tag_compilation INTEGER NOT NULL DEFAULT 0,
                external_id TEXT,
                raw_tags TEXT,
                FOREIGN KEY (file_id) REFERENCES files(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_metadata_tags
                ON metadata(tag_artist, tag_album, tag_title);
            CREATE INDEX IF NOT EXISTS idx_metadata_duration ON metadata(duration_ms);
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Clusters and membership
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS clusters (
                cluster_key TEXT PRIMARY KEY,
                hint TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS cluster_members (
                cluster_key TEXT NOT NULL,
                file_id INTEGER NOT NULL,
                quality_score REAL NOT NULL DEFAULT 0,
                preferred INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (cluster_key, file_id),
                FOREIGN KEY (cluster_key) REFERENCES clusters(cluster_key) ON DELETE CASCADE,
                FOREIGN KEY (file_id) REFERENCES files(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_cluster_members_file_id
                ON cluster_members(file_id);
            CREATE INDEX IF NOT EXISTS idx_cluster_members_preferred
                ON cluster_members(cluster_key, preferred);
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Plans and executions
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS plans (
                file_id INTEGER PRIMARY KEY,
                action TEXT NOT NULL,
                dest_path TEXT NOT NULL DEFAULT '',
                reason TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL,
                FOREIGN KEY (file_id) REFERENCES files(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_plans_dest_path ON plans(dest_path);
            CREATE INDEX IF NOT EXISTS idx_plans_action ON plans(action);
            CREATE TABLE IF NOT EXISTS executions (
                file_id INTEGER PRIMARY KEY,
                started_at INTEGER NOT NULL,
                completed_at INTEGER NOT NULL DEFAULT 0,
                bytes_written INTEGER NOT NULL DEFAULT 0,
                verify_ok INTEGER NOT NULL DEFAULT 0,
                error TEXT,
                FOREIGN KEY (file_id) REFERENCES files(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_executions_verify_ok ON executions(verify_ok);
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Clustering resume checkpoint (singleton row)
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS clustering_progress (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                last_file_id INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Migration bookkeeping
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS dbmigration (
                id INTEGER PRIMARY KEY,
                version INTEGER NOT NULL DEFAULT 0
            );
            INSERT OR IGNORE INTO dbmigration (id, version) VALUES (1, 0);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
