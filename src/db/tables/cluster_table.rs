//! Cluster, membership and clustering-progress table operations

use anyhow::Result;
use sqlx::{FromRow, SqlitePool};

use crate::models::{Cluster, ClusterMember};

#[derive(Debug, FromRow)]
struct ClusterRow {
    cluster_key: String,
    hint: String,
    created_at: i64,
}

#[derive(Debug, FromRow)]
struct MemberRow {
    cluster_key: String,
    file_id: i64,
    quality_score: f64,
    preferred: i32,
}

impl MemberRow {
    fn into_member(self) -> ClusterMember {
        ClusterMember {
            cluster_key: self.cluster_key,
            file_id: self.file_id,
            quality_score: self.quality_score,
            preferred: self.preferred != 0,
        }
    }
}

/// Cluster table operations
pub struct ClusterTable;

impl ClusterTable {
    /// Create the cluster if it does not exist yet
    pub async fn insert_cluster(pool: &SqlitePool, cluster: &Cluster) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO clusters (cluster_key, hint, created_at) VALUES (?, ?, ?)",
        )
        .bind(&cluster.cluster_key)
        .bind(&cluster.hint)
        .bind(cluster.created_at)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Add a member; re-runs must not duplicate existing membership
    pub async fn insert_member(pool: &SqlitePool, cluster_key: &str, file_id: i64) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO cluster_members (cluster_key, file_id) VALUES (?, ?)",
        )
        .bind(cluster_key)
        .bind(file_id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// All cluster keys
    pub async fn all_keys(pool: &SqlitePool) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT cluster_key FROM clusters ORDER BY cluster_key")
            .fetch_all(pool)
            .await?;

        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    /// All clusters
    pub async fn all(pool: &SqlitePool) -> Result<Vec<Cluster>> {
        let rows: Vec<ClusterRow> = sqlx::query_as("SELECT * FROM clusters ORDER BY cluster_key")
            .fetch_all(pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| Cluster {
                cluster_key: r.cluster_key,
                hint: r.hint,
                created_at: r.created_at,
            })
            .collect())
    }

    /// Members of one cluster
    pub async fn members(pool: &SqlitePool, cluster_key: &str) -> Result<Vec<ClusterMember>> {
        let rows: Vec<MemberRow> =
            sqlx::query_as("SELECT * FROM cluster_members WHERE cluster_key = ? ORDER BY file_id")
                .bind(cluster_key)
                .fetch_all(pool)
                .await?;

        Ok(rows.into_iter().map(|r| r.into_member()).collect())
    }

    /// Membership row for one file
    pub async fn member_for_file(pool: &SqlitePool, file_id: i64) -> Result<Option<ClusterMember>> {
        let row: Option<MemberRow> =
            sqlx::query_as("SELECT * FROM cluster_members WHERE file_id = ?")
                .bind(file_id)
                .fetch_optional(pool)
                .await?;

        Ok(row.map(|r| r.into_member()))
    }

    /// Write a member's quality score
    pub async fn set_score(
        pool: &SqlitePool,
        cluster_key: &str,
        file_id: i64,
        score: f64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE cluster_members SET quality_score = ? WHERE cluster_key = ? AND file_id = ?",
        )
        .bind(score)
        .bind(cluster_key)
        .bind(file_id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Mark exactly one member preferred, clearing the rest
    pub async fn set_preferred(pool: &SqlitePool, cluster_key: &str, file_id: i64) -> Result<()> {
        let mut tx = pool.begin().await?;

        sqlx::query("UPDATE cluster_members SET preferred = 0 WHERE cluster_key = ?")
            .bind(cluster_key)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE cluster_members SET preferred = 1 WHERE cluster_key = ? AND file_id = ?",
        )
        .bind(cluster_key)
        .bind(file_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }

    /// Count of clusters
    pub async fn count(pool: &SqlitePool) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM clusters")
            .fetch_one(pool)
            .await?;

        Ok(row.0)
    }

    /// Oldest last_update_at among clustered files (None when no members)
    pub async fn oldest_member_update_at(pool: &SqlitePool) -> Result<Option<i64>> {
        let row: (Option<i64>,) = sqlx::query_as(
            r#"
            SELECT MIN(f.last_update_at)
            FROM cluster_members cm JOIN files f ON f.id = cm.file_id
            "#,
        )
        .fetch_one(pool)
        .await?;

        Ok(row.0)
    }

    /// Drop all clusters, members and the resume checkpoint
    pub async fn clear_all(pool: &SqlitePool) -> Result<()> {
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM cluster_members").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM clusters").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM clustering_progress").execute(&mut *tx).await?;

        tx.commit().await?;

        Ok(())
    }

    /// Resume checkpoint: last file id fully clustered (None when fresh)
    pub async fn get_progress(pool: &SqlitePool) -> Result<Option<i64>> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT last_file_id FROM clustering_progress WHERE id = 1")
                .fetch_optional(pool)
                .await?;

        Ok(row.map(|r| r.0))
    }

    /// Record the resume checkpoint
    pub async fn set_progress(pool: &SqlitePool, last_file_id: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO clustering_progress (id, last_file_id) VALUES (1, ?)
            ON CONFLICT(id) DO UPDATE SET last_file_id = excluded.last_file_id
            "#,
        )
        .bind(last_file_id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Clear the checkpoint after a completed clustering pass
    pub async fn clear_progress(pool: &SqlitePool) -> Result<()> {
        sqlx::query("DELETE FROM clustering_progress")
            .execute(pool)
            .await?;

        Ok(())
    }
}
