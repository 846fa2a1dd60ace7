//! Source retrieval and soft deletion.
//!
//! Used by `ragctl get` / `ragctl deactivate` and by the
//! `GET /rag/sources/{id}` and `POST /rag/sources/{id}/deactivate` routes.

use anyhow::{bail, Result};
use serde::Serialize;
use tracing::info;

use coach_rag_core::models::{CoachAccessGrant, ContentSource};
use coach_rag_core::store::Store;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;
use crate::db;

/// Chunk listing entry (content and vector omitted).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkSummary {
    pub id: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub version: u32,
    pub is_active: bool,
    pub title: String,
    pub char_length: usize,
}

/// A source with its chunks and grants.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDetail {
    pub source: ContentSource,
    pub active_chunk_count: u64,
    pub chunks: Vec<ChunkSummary>,
    pub grants: Vec<CoachAccessGrant>,
}

/// Load a source with its chunks and grants. `None` when unknown.
pub async fn get_source_detail(store: &dyn Store, id: &str) -> Result<Option<SourceDetail>> {
    let Some(source) = store.get_source(id).await? else {
        return Ok(None);
    };

    let chunks: Vec<ChunkSummary> = store
        .list_chunks(id)
        .await?
        .into_iter()
        .map(|c| ChunkSummary {
            id: c.id,
            chunk_index: c.chunk_index,
            total_chunks: c.total_chunks,
            version: c.version,
            is_active: c.is_active,
            title: c.title,
            char_length: c.metadata.char_length,
        })
        .collect();
    let active_chunk_count = chunks.iter().filter(|c| c.is_active).count() as u64;
    let grants = store.list_grants(id).await?;

    Ok(Some(SourceDetail {
        source,
        active_chunk_count,
        chunks,
        grants,
    }))
}

/// Soft-delete every active chunk of a source, reopening it for
/// ingestion. Returns the number of chunks deactivated, `None` when the
/// source is unknown.
pub async fn deactivate_source(store: &dyn Store, id: &str) -> Result<Option<u64>> {
    if store.get_source(id).await?.is_none() {
        return Ok(None);
    }
    let changed = store.deactivate_chunks(id).await?;
    info!(source_id = id, deactivated = changed, "source chunks deactivated");
    Ok(Some(changed))
}

/// CLI entry point: print a source summary to stdout.
pub async fn run_get(config: &Config, id: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let detail = get_source_detail(&store, id).await?;
    pool.close().await;

    let Some(detail) = detail else {
        bail!("source not found: {}", id);
    };
    let source = &detail.source;

    println!("--- Source ---");
    println!("id:           {}", source.id);
    println!("title:        {}", source.title);
    println!("type:         {}", source.source_type);
    if let Some(ref name) = source.file_name {
        println!("file_name:    {}", name);
    }
    if let Some(ref url) = source.source_url {
        println!("source_url:   {}", url);
    }
    println!("content_hash: {}", source.content_hash);
    println!("status:       {}", source.metadata.process_status);
    println!("created_at:   {}", source.created_at.to_rfc3339());
    println!("updated_at:   {}", source.updated_at.to_rfc3339());
    println!("metadata:     {}", serde_json::to_string(&source.metadata)?);
    println!();

    println!(
        "--- Chunks ({}, {} active) ---",
        detail.chunks.len(),
        detail.active_chunk_count
    );
    for chunk in &detail.chunks {
        println!(
            "[v{} #{}/{}] {} ({} chars){}",
            chunk.version,
            chunk.chunk_index,
            chunk.total_chunks,
            chunk.title,
            chunk.char_length,
            if chunk.is_active { "" } else { " inactive" }
        );
    }
    println!();

    println!("--- Grants ({}) ---", detail.grants.len());
    for grant in &detail.grants {
        println!("{}  {}  {}", grant.chunk_id, grant.coach_id, grant.access_tier);
    }

    Ok(())
}

/// CLI entry point for `ragctl deactivate`.
pub async fn run_deactivate(config: &Config, id: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let changed = deactivate_source(&store, id).await?;
    pool.close().await;

    match changed {
        Some(n) => {
            println!("deactivated {} chunk(s) of source {}", n, id);
            Ok(())
        }
        None => bail!("source not found: {}", id),
    }
}
