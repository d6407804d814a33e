//! Metadata table operations

use anyhow::Result;
use sqlx::{FromRow, SqlitePool};

use crate::models::TrackMeta;

/// Database row for the metadata table
#[derive(Debug, FromRow)]
struct MetaRow {
    file_id: i64,
    format: String,
    codec: String,
    container: String,
    duration_ms: i64,
    sample_rate: i32,
    bit_depth: i32,
    channels: i32,
    bitrate_kbps: i32,
    lossless: i32,
    tag_artist: String,
    tag_album: String,
    tag_title: String,
    tag_albumartist: String,
    tag_date: String,
    tag_track: i32,
    tag_track_total: i32,
    tag_disc: i32,
    tag_disc_total: i32,
    tag_compilation: i32,
    external_id: Option<String>,
    raw_tags: Option<String>,
}

impl MetaRow {
    fn into_meta(self) -> TrackMeta {
        let raw_tags = self
            .raw_tags
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or(serde_json::Value::Null);

        TrackMeta {
            file_id: self.file_id,
            format: self.format,
            codec: self.codec,
            container: self.container,
            duration_ms: self.duration_ms,
            sample_rate: self.sample_rate,
            bit_depth: self.bit_depth,
            channels: self.channels,
            bitrate_kbps: self.bitrate_kbps,
            lossless: self.lossless != 0,
            tag_artist: self.tag_artist,
            tag_album: self.tag_album,
            tag_title: self.tag_title,
            tag_albumartist: self.tag_albumartist,
            tag_date: self.tag_date,
            tag_track: self.tag_track,
            tag_track_total: self.tag_track_total,
            tag_disc: self.tag_disc,
            tag_disc_total: self.tag_disc_total,
            tag_compilation: self.tag_compilation != 0,
            external_id: self.external_id,
            raw_tags,
        }
    }
}

/// Metadata table operations
pub struct MetadataTable;

impl MetadataTable {
    /// Insert or replace the metadata row for a file
    pub async fn upsert(pool: &SqlitePool, meta: &TrackMeta) -> Result<()> {
        let raw_tags = serde_json::to_string(&meta.raw_tags)?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO metadata (
                file_id, format, codec, container, duration_ms, sample_rate,
                bit_depth, channels, bitrate_kbps, lossless,
                tag_artist, tag_album, tag_title, tag_albumartist, tag_date,
                tag_track, tag_track_total, tag_disc, tag_disc_total,
                tag_compilation, external_id, raw_tags
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(meta.file_id)
        .bind(&meta.format)
        .bind(&meta.codec)
        .bind(&meta.container)
        .bind(meta.duration_ms)
        .bind(meta.sample_rate)
        .bind(meta.bit_depth)
        .bind(meta.channels)
        .bind(meta.bitrate_kbps)
        .bind(meta.lossless as i32)
        .bind(&meta.tag_artist)
        .bind(&meta.tag_album)
        .bind(&meta.tag_title)
        .bind(&meta.tag_albumartist)
        .bind(&meta.tag_date)
        .bind(meta.tag_track)
        .bind(meta.tag_track_total)
        .bind(meta.tag_disc)
        .bind(meta.tag_disc_total)
        .bind(meta.tag_compilation as i32)
        .bind(&meta.external_id)
        .bind(&raw_tags)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Get metadata for a file
    pub async fn get(pool: &SqlitePool, file_id: i64) -> Result<Option<TrackMeta>> {
        let row: Option<MetaRow> = sqlx::query_as("SELECT * FROM metadata WHERE file_id = ?")
            .bind(file_id)
            .fetch_optional(pool)
            .await?;

        Ok(row.map(|r| r.into_meta()))
    }

    /// Get metadata for a set of files
    pub async fn get_many(pool: &SqlitePool, file_ids: &[i64]) -> Result<Vec<TrackMeta>> {
        if file_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders: String = file_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let query = format!(
            "SELECT * FROM metadata WHERE file_id IN ({})",
            placeholders
        );

        let mut query_builder = sqlx::query_as::<_, MetaRow>(&query);
        for id in file_ids {
            query_builder = query_builder.bind(id);
        }

        let rows = query_builder.fetch_all(pool).await?;
        Ok(rows.into_iter().map(|r| r.into_meta()).collect())
    }

    /// All metadata rows, ordered by file id
    pub async fn all(pool: &SqlitePool) -> Result<Vec<TrackMeta>> {
        let rows: Vec<MetaRow> = sqlx::query_as("SELECT * FROM metadata ORDER BY file_id")
            .fetch_all(pool)
            .await?;

        Ok(rows.into_iter().map(|r| r.into_meta()).collect())
    }

    /// Distinct (case-insensitive) track artists across an album name
    ///
    /// Feeds the real-compilation test in planning: an album only gets
    /// the Various Artists layout when at least three distinct track
    /// artists share it.
    pub async fn distinct_artists_for_album(pool: &SqlitePool, album: &str) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(DISTINCT LOWER(tag_artist)) FROM metadata
            WHERE LOWER(tag_album) = LOWER(?) AND tag_artist != ''
            "#,
        )
        .bind(album)
        .fetch_one(pool)
        .await?;

        Ok(row.0)
    }
}
