//! SQLite-backed [`Store`] implementation.
//!
//! Maps each [`Store`] operation onto the `content_sources`, `chunks` and
//! `coach_access` tables created by [`crate::migrate`]. Uniqueness
//! violations reported by SQLite are rewrapped as [`UniqueViolation`] so the
//! orchestrator can treat a concurrent insert as a duplicate.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use coach_rag_core::embedding::{blob_to_vec, vec_to_blob};
use coach_rag_core::models::{
    Chunk, ChunkMetadata, CoachAccessGrant, ContentSource, NewContentSource, SourceMetadata,
};
use coach_rag_core::store::{Store, StoreStats, UniqueViolation};

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Rewrap a unique-constraint failure as [`UniqueViolation`]; other
/// errors pass through with `what` as context.
fn map_write_err(err: sqlx::Error, key: &str, what: &str) -> anyhow::Error {
    let is_unique = err
        .as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false);
    if is_unique {
        anyhow::Error::new(UniqueViolation(key.to_string())).context(what.to_string())
    } else {
        anyhow::Error::new(err).context(what.to_string())
    }
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("invalid timestamp in database: {}", raw))?
        .with_timezone(&Utc))
}

const SOURCE_COLUMNS: &str = "id, title, source_type, file_name, source_url, content_hash, \
                              content, metadata_json, created_at, updated_at";

const CHUNK_COLUMNS: &str = "id, source_id, title, content, chunk_index, total_chunks, \
                             embedding, metadata_json, version, is_active, created_at";

fn row_to_source(row: &SqliteRow) -> Result<ContentSource> {
    let source_type: String = row.try_get("source_type")?;
    let metadata_json: String = row.try_get("metadata_json")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(ContentSource {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        source_type: source_type.parse()?,
        file_name: row.try_get("file_name")?,
        source_url: row.try_get("source_url")?,
        content_hash: row.try_get("content_hash")?,
        content: row.try_get("content")?,
        metadata: serde_json::from_str(&metadata_json)
            .context("invalid source metadata in database")?,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

fn row_to_chunk(row: &SqliteRow) -> Result<Chunk> {
    let embedding: Vec<u8> = row.try_get("embedding")?;
    let metadata_json: String = row.try_get("metadata_json")?;
    let chunk_index: i64 = row.try_get("chunk_index")?;
    let total_chunks: i64 = row.try_get("total_chunks")?;
    let version: i64 = row.try_get("version")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(Chunk {
        id: row.try_get("id")?,
        source_id: row.try_get("source_id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        chunk_index: chunk_index as usize,
        total_chunks: total_chunks as usize,
        embedding: blob_to_vec(&embedding),
        metadata: serde_json::from_str::<ChunkMetadata>(&metadata_json)
            .context("invalid chunk metadata in database")?,
        version: version as u32,
        is_active: row.try_get("is_active")?,
        created_at: parse_ts(&created_at)?,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn find_source_by_hash(&self, content_hash: &str) -> Result<Option<ContentSource>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM content_sources \
             WHERE content_hash = ? AND source_url IS NULL \
             ORDER BY created_at LIMIT 1",
            SOURCE_COLUMNS
        ))
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_source).transpose()
    }

    async fn find_source_by_url(&self, source_url: &str) -> Result<Option<ContentSource>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM content_sources WHERE source_url = ? LIMIT 1",
            SOURCE_COLUMNS
        ))
        .bind(source_url)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_source).transpose()
    }

    async fn get_source(&self, id: &str) -> Result<Option<ContentSource>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM content_sources WHERE id = ?",
            SOURCE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_source).transpose()
    }

    async fn count_active_chunks(&self, source_id: &str) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE source_id = ? AND is_active = 1")
                .bind(source_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }

    async fn insert_source(&self, source: &NewContentSource) -> Result<ContentSource> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let metadata_json = serde_json::to_string(&source.metadata)?;

        sqlx::query(
            r#"
            INSERT INTO content_sources (id, title, source_type, file_name, source_url,
                                         content_hash, content, metadata_json,
                                         created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&source.title)
        .bind(source.source_type.as_str())
        .bind(&source.file_name)
        .bind(&source.source_url)
        .bind(&source.content_hash)
        .bind(&source.content)
        .bind(&metadata_json)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_err(e, "content_sources dedup key", "insert content source"))?;

        Ok(ContentSource {
            id,
            title: source.title.clone(),
            source_type: source.source_type,
            file_name: source.file_name.clone(),
            source_url: source.source_url.clone(),
            content_hash: source.content_hash.clone(),
            content: source.content.clone(),
            metadata: source.metadata.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn reset_source(
        &self,
        previous: &ContentSource,
        source: &NewContentSource,
    ) -> Result<ContentSource> {
        let id = previous.id.as_str();
        let now = Utc::now();
        let metadata_json = serde_json::to_string(&source.metadata)?;

        let result = sqlx::query(
            r#"
            UPDATE content_sources
            SET title = ?, source_type = ?, file_name = ?, source_url = ?,
                content_hash = ?, content = ?, metadata_json = ?, updated_at = ?
            WHERE id = ? AND updated_at = ?
              AND NOT EXISTS (SELECT 1 FROM chunks WHERE source_id = ? AND is_active = 1)
            "#,
        )
        .bind(&source.title)
        .bind(source.source_type.as_str())
        .bind(&source.file_name)
        .bind(&source.source_url)
        .bind(&source.content_hash)
        .bind(&source.content)
        .bind(&metadata_json)
        .bind(now.to_rfc3339())
        .bind(id)
        .bind(previous.updated_at.to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_err(e, "content_sources dedup key", "reset content source"))?;

        if result.rows_affected() == 0 {
            if self.get_source(id).await?.is_none() {
                bail!("content source not found: {}", id);
            }
            // Another attempt claimed the row since `previous` was read.
            return Err(anyhow::Error::new(UniqueViolation(format!("content_sources.id {}", id)))
                .context("reset content source"));
        }

        self.get_source(id)
            .await?
            .ok_or_else(|| anyhow!("content source not found: {}", id))
    }

    async fn update_source_metadata(&self, id: &str, metadata: &SourceMetadata) -> Result<()> {
        let result =
            sqlx::query("UPDATE content_sources SET metadata_json = ?, updated_at = ? WHERE id = ?")
                .bind(serde_json::to_string(metadata)?)
                .bind(Utc::now().to_rfc3339())
                .bind(id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            bail!("content source not found: {}", id);
        }
        Ok(())
    }

    async fn next_chunk_version(&self, source_id: &str) -> Result<u32> {
        let version: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) + 1 FROM chunks WHERE source_id = ?")
                .bind(source_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(version as u32)
    }

    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, source_id, title, content, chunk_index, total_chunks,
                                    embedding, metadata_json, version, is_active, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.source_id)
            .bind(&chunk.title)
            .bind(&chunk.content)
            .bind(chunk.chunk_index as i64)
            .bind(chunk.total_chunks as i64)
            .bind(vec_to_blob(&chunk.embedding))
            .bind(serde_json::to_string(&chunk.metadata)?)
            .bind(chunk.version as i64)
            .bind(chunk.is_active)
            .bind(chunk.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                map_write_err(
                    e,
                    "chunks(source_id, version, chunk_index)",
                    "insert chunk",
                )
            })?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn insert_access_grant(&self, grant: &CoachAccessGrant) -> Result<()> {
        sqlx::query(
            "INSERT INTO coach_access (chunk_id, coach_id, access_tier, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&grant.chunk_id)
        .bind(&grant.coach_id)
        .bind(grant.access_tier.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            map_write_err(
                e,
                "coach_access(chunk_id, coach_id)",
                "insert coach access grant",
            )
        })?;
        Ok(())
    }

    async fn list_chunks(&self, source_id: &str) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM chunks WHERE source_id = ? ORDER BY version, chunk_index",
            CHUNK_COLUMNS
        ))
        .bind(source_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_chunk).collect()
    }

    async fn list_grants(&self, source_id: &str) -> Result<Vec<CoachAccessGrant>> {
        let rows = sqlx::query(
            r#"
            SELECT a.chunk_id, a.coach_id, a.access_tier
            FROM coach_access a
            JOIN chunks c ON c.id = a.chunk_id
            WHERE c.source_id = ?
            ORDER BY c.version, c.chunk_index, a.coach_id
            "#,
        )
        .bind(source_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let tier: String = row.try_get("access_tier")?;
                Ok(CoachAccessGrant {
                    chunk_id: row.try_get("chunk_id")?,
                    coach_id: row.try_get("coach_id")?,
                    access_tier: tier.parse()?,
                })
            })
            .collect()
    }

    async fn deactivate_chunks(&self, source_id: &str) -> Result<u64> {
        let result =
            sqlx::query("UPDATE chunks SET is_active = 0 WHERE source_id = ? AND is_active = 1")
                .bind(source_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let sources: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM content_sources")
            .fetch_one(&self.pool)
            .await?;
        let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        let active_chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;

        let status_rows = sqlx::query(
            r#"
            SELECT COALESCE(json_extract(metadata_json, '$.processStatus'), 'pending') AS status,
                   COUNT(*) AS n
            FROM content_sources
            GROUP BY status
            ORDER BY status
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let tier_rows = sqlx::query(
            "SELECT access_tier, COUNT(*) AS n FROM coach_access GROUP BY access_tier ORDER BY access_tier",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut sources_by_status = Vec::new();
        for row in &status_rows {
            let status: String = row.try_get("status")?;
            let n: i64 = row.try_get("n")?;
            sources_by_status.push((status, n as u64));
        }

        let mut grants_by_tier = Vec::new();
        for row in &tier_rows {
            let tier: String = row.try_get("access_tier")?;
            let n: i64 = row.try_get("n")?;
            grants_by_tier.push((tier, n as u64));
        }

        Ok(StoreStats {
            sources: sources as u64,
            sources_by_status,
            chunks: chunks as u64,
            active_chunks: active_chunks as u64,
            grants_by_tier,
        })
    }
}
