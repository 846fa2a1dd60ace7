//! In-memory [`Store`] implementation for tests and embedding.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock`. Enforces the same
//! uniqueness rules as the SQLite schema: one document source per content
//! hash and one source per canonical URL.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::models::{
    Chunk, CoachAccessGrant, ContentSource, NewContentSource, SourceMetadata, SourceType,
};

use super::{Store, StoreStats, UniqueViolation};

/// In-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    sources: RwLock<HashMap<String, ContentSource>>,
    chunks: RwLock<Vec<Chunk>>,
    grants: RwLock<Vec<CoachAccessGrant>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of grant rows across all sources.
    pub fn grant_count(&self) -> usize {
        read(&self.grants).map(|g| g.len()).unwrap_or(0)
    }

    /// Number of source rows.
    pub fn source_count(&self) -> usize {
        read(&self.sources).map(|s| s.len()).unwrap_or(0)
    }

    /// Number of chunk rows (active or not).
    pub fn chunk_count(&self) -> usize {
        read(&self.chunks).map(|c| c.len()).unwrap_or(0)
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

/// Reject `candidate` if another source (other than `except_id`) already
/// owns its dedup key.
fn check_unique(
    sources: &HashMap<String, ContentSource>,
    candidate: &NewContentSource,
    except_id: Option<&str>,
) -> Result<()> {
    for existing in sources.values() {
        if Some(existing.id.as_str()) == except_id {
            continue;
        }
        if candidate.source_type == SourceType::Document
            && existing.source_type == SourceType::Document
            && existing.content_hash == candidate.content_hash
        {
            return Err(UniqueViolation("content_sources.content_hash".to_string()).into());
        }
        if candidate.source_url.is_some() && existing.source_url == candidate.source_url {
            return Err(UniqueViolation("content_sources.source_url".to_string()).into());
        }
    }
    Ok(())
}

#[async_trait]
impl Store for InMemoryStore {
    async fn find_source_by_hash(&self, content_hash: &str) -> Result<Option<ContentSource>> {
        let sources = read(&self.sources)?;
        Ok(sources
            .values()
            .filter(|s| s.source_url.is_none() && s.content_hash == content_hash)
            .min_by_key(|s| s.created_at)
            .cloned())
    }

    async fn find_source_by_url(&self, source_url: &str) -> Result<Option<ContentSource>> {
        let sources = read(&self.sources)?;
        Ok(sources
            .values()
            .find(|s| s.source_url.as_deref() == Some(source_url))
            .cloned())
    }

    async fn get_source(&self, id: &str) -> Result<Option<ContentSource>> {
        Ok(read(&self.sources)?.get(id).cloned())
    }

    async fn count_active_chunks(&self, source_id: &str) -> Result<u64> {
        let chunks = read(&self.chunks)?;
        Ok(chunks
            .iter()
            .filter(|c| c.source_id == source_id && c.is_active)
            .count() as u64)
    }

    async fn insert_source(&self, source: &NewContentSource) -> Result<ContentSource> {
        let mut sources = write(&self.sources)?;
        check_unique(&sources, source, None)?;

        let now = Utc::now();
        let stored = ContentSource {
            id: Uuid::new_v4().to_string(),
            title: source.title.clone(),
            source_type: source.source_type,
            file_name: source.file_name.clone(),
            source_url: source.source_url.clone(),
            content_hash: source.content_hash.clone(),
            content: source.content.clone(),
            metadata: source.metadata.clone(),
            created_at: now,
            updated_at: now,
        };
        sources.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn reset_source(
        &self,
        previous: &ContentSource,
        source: &NewContentSource,
    ) -> Result<ContentSource> {
        let id = previous.id.as_str();
        let mut sources = write(&self.sources)?;
        check_unique(&sources, source, Some(id))?;

        let has_active = read(&self.chunks)?
            .iter()
            .any(|c| c.source_id == id && c.is_active);
        let stored = sources
            .get_mut(id)
            .ok_or_else(|| anyhow!("content source not found: {}", id))?;
        if has_active || stored.updated_at != previous.updated_at {
            return Err(UniqueViolation(format!("content_sources.id {}", id)).into());
        }
        stored.title = source.title.clone();
        stored.source_type = source.source_type;
        stored.file_name = source.file_name.clone();
        stored.source_url = source.source_url.clone();
        stored.content_hash = source.content_hash.clone();
        stored.content = source.content.clone();
        stored.metadata = source.metadata.clone();
        // Strictly newer, so a second claim from the same snapshot fails.
        stored.updated_at = Utc::now().max(stored.updated_at + Duration::nanoseconds(1));
        Ok(stored.clone())
    }

    async fn update_source_metadata(&self, id: &str, metadata: &SourceMetadata) -> Result<()> {
        let mut sources = write(&self.sources)?;
        let stored = sources
            .get_mut(id)
            .ok_or_else(|| anyhow!("content source not found: {}", id))?;
        stored.metadata = metadata.clone();
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn next_chunk_version(&self, source_id: &str) -> Result<u32> {
        let chunks = read(&self.chunks)?;
        Ok(chunks
            .iter()
            .filter(|c| c.source_id == source_id)
            .map(|c| c.version)
            .max()
            .map_or(1, |v| v + 1))
    }

    async fn insert_chunks(&self, new_chunks: &[Chunk]) -> Result<()> {
        let sources = read(&self.sources)?;
        let mut chunks = write(&self.chunks)?;

        // Validate the whole batch before touching storage.
        for c in new_chunks {
            if !sources.contains_key(&c.source_id) {
                bail!("chunk {} references unknown source {}", c.id, c.source_id);
            }
            let clash = chunks.iter().any(|existing| {
                existing.source_id == c.source_id
                    && existing.version == c.version
                    && existing.chunk_index == c.chunk_index
            });
            if clash {
                return Err(
                    UniqueViolation("chunks(source_id, version, chunk_index)".to_string()).into(),
                );
            }
        }
        chunks.extend(new_chunks.iter().cloned());
        Ok(())
    }

    async fn insert_access_grant(&self, grant: &CoachAccessGrant) -> Result<()> {
        let chunks = read(&self.chunks)?;
        if !chunks.iter().any(|c| c.id == grant.chunk_id) {
            bail!("grant references unknown chunk {}", grant.chunk_id);
        }
        let mut grants = write(&self.grants)?;
        if grants
            .iter()
            .any(|g| g.chunk_id == grant.chunk_id && g.coach_id == grant.coach_id)
        {
            return Err(UniqueViolation("coach_access(chunk_id, coach_id)".to_string()).into());
        }
        grants.push(grant.clone());
        Ok(())
    }

    async fn list_chunks(&self, source_id: &str) -> Result<Vec<Chunk>> {
        let chunks = read(&self.chunks)?;
        let mut out: Vec<Chunk> = chunks
            .iter()
            .filter(|c| c.source_id == source_id)
            .cloned()
            .collect();
        out.sort_by_key(|c| (c.version, c.chunk_index));
        Ok(out)
    }

    async fn list_grants(&self, source_id: &str) -> Result<Vec<CoachAccessGrant>> {
        let chunks = read(&self.chunks)?;
        let grants = read(&self.grants)?;
        Ok(grants
            .iter()
            .filter(|g| {
                chunks
                    .iter()
                    .any(|c| c.id == g.chunk_id && c.source_id == source_id)
            })
            .cloned()
            .collect())
    }

    async fn deactivate_chunks(&self, source_id: &str) -> Result<u64> {
        let mut chunks = write(&self.chunks)?;
        let mut changed = 0u64;
        for c in chunks
            .iter_mut()
            .filter(|c| c.source_id == source_id && c.is_active)
        {
            c.is_active = false;
            changed += 1;
        }
        Ok(changed)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let sources = read(&self.sources)?;
        let chunks = read(&self.chunks)?;
        let grants = read(&self.grants)?;

        let mut by_status: BTreeMap<String, u64> = BTreeMap::new();
        for s in sources.values() {
            *by_status
                .entry(s.metadata.process_status.to_string())
                .or_default() += 1;
        }
        let mut by_tier: BTreeMap<String, u64> = BTreeMap::new();
        for g in grants.iter() {
            *by_tier.entry(g.access_tier.to_string()).or_default() += 1;
        }

        Ok(StoreStats {
            sources: sources.len() as u64,
            sources_by_status: by_status.into_iter().collect(),
            chunks: chunks.len() as u64,
            active_chunks: chunks.iter().filter(|c| c.is_active).count() as u64,
            grants_by_tier: by_tier.into_iter().collect(),
        })
    }
}
