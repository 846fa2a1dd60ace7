//! Soft-delete-aware duplicate detection.
//!
//! A source matching the dedup key is only a duplicate while it still has
//! at least one active chunk. A matched source whose chunks were all
//! soft-deleted (or never persisted) is returned as `existing` but with
//! `is_duplicate = false`, so the caller can reuse it for re-ingestion.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::models::ContentSource;
use crate::store::Store;

/// What identifies "the same material".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupKey {
    /// SHA-256 of the uploaded bytes.
    ContentHash(String),
    /// Canonical video URL.
    SourceUrl(String),
}

impl DedupKey {
    pub fn as_str(&self) -> &str {
        match self {
            DedupKey::ContentHash(h) => h,
            DedupKey::SourceUrl(u) => u,
        }
    }
}

/// Result of a duplicate check.
#[derive(Debug, Clone)]
pub struct DuplicateCheck {
    pub is_duplicate: bool,
    pub existing: Option<ContentSource>,
    pub active_chunk_count: u64,
}

impl DuplicateCheck {
    fn absent() -> Self {
        Self {
            is_duplicate: false,
            existing: None,
            active_chunk_count: 0,
        }
    }

    /// The matched source if it may be reused for a new attempt.
    pub fn reusable(&self) -> Option<&ContentSource> {
        if self.is_duplicate {
            None
        } else {
            self.existing.as_ref()
        }
    }

    /// Conflict payload describing the existing source.
    pub fn existing_document(&self) -> Option<ExistingDocument> {
        self.existing.as_ref().map(|s| ExistingDocument {
            id: s.id.clone(),
            title: s.title.clone(),
            uploaded_at: s.created_at.to_rfc3339(),
            chunk_count: self.active_chunk_count,
        })
    }
}

/// Details of the source that made an ingestion request a duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistingDocument {
    pub id: String,
    pub title: String,
    pub uploaded_at: String,
    pub chunk_count: u64,
}

/// Look up a source by `key` and decide whether it is a true duplicate.
///
/// Lookup errors are propagated; callers treat them as fatal for the item.
pub async fn check_duplicate(store: &dyn Store, key: &DedupKey) -> Result<DuplicateCheck> {
    let existing = match key {
        DedupKey::ContentHash(hash) => store.find_source_by_hash(hash).await,
        DedupKey::SourceUrl(url) => store.find_source_by_url(url).await,
    }
    .with_context(|| format!("duplicate lookup failed for {}", key.as_str()))?;

    let Some(existing) = existing else {
        return Ok(DuplicateCheck::absent());
    };

    let active_chunk_count = store
        .count_active_chunks(&existing.id)
        .await
        .with_context(|| format!("active chunk count failed for source {}", existing.id))?;

    Ok(DuplicateCheck {
        is_duplicate: active_chunk_count > 0,
        existing: Some(existing),
        active_chunk_count,
    })
}
