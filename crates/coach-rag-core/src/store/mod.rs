//! Storage abstraction for the ingestion pipeline.
//!
//! The [`Store`] trait defines every datastore operation the pipeline
//! needs, enabling pluggable backends (SQLite in the application crate,
//! [`memory::InMemoryStore`] for tests and embedding).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! # Uniqueness
//!
//! Backends enforce uniqueness of `content_hash` for document sources and
//! of `source_url` for video sources. A violated constraint must surface as
//! an error whose chain contains [`UniqueViolation`], so callers can tell a
//! concurrent duplicate apart from an ordinary persistence failure:
//!
//! ```rust
//! use coach_rag_core::store::{is_unique_violation, UniqueViolation};
//!
//! let err = anyhow::Error::new(UniqueViolation("content_hash".into())).context("insert source");
//! assert!(is_unique_violation(&err));
//! ```

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::{Chunk, CoachAccessGrant, ContentSource, NewContentSource, SourceMetadata};

/// Raised by a [`Store`] when an insert or update collides with a
/// uniqueness constraint. Carries the name of the violated key.
#[derive(Debug, thiserror::Error)]
#[error("unique constraint violated on {0}")]
pub struct UniqueViolation(pub String);

/// Returns true when `err` (or anything in its chain) is a [`UniqueViolation`].
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|e| e.is::<UniqueViolation>())
}

/// Aggregate counts for a stats overview.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub sources: u64,
    pub sources_by_status: Vec<(String, u64)>,
    pub chunks: u64,
    pub active_chunks: u64,
    pub grants_by_tier: Vec<(String, u64)>,
}

/// Abstract datastore for content sources, chunks, and access grants.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`find_source_by_hash`](Store::find_source_by_hash) | Dedup lookup for files |
/// | [`find_source_by_url`](Store::find_source_by_url) | Dedup lookup for videos |
/// | [`count_active_chunks`](Store::count_active_chunks) | Active-chunk count for the dedup rule |
/// | [`insert_source`](Store::insert_source) | Create a source (may raise [`UniqueViolation`]) |
/// | [`reset_source`](Store::reset_source) | Re-initialize a source for a new attempt |
/// | [`update_source_metadata`](Store::update_source_metadata) | Record processing facts |
/// | [`next_chunk_version`](Store::next_chunk_version) | Version for a new chunk batch |
/// | [`insert_chunks`](Store::insert_chunks) | Bulk insert, all or nothing |
/// | [`insert_access_grant`](Store::insert_access_grant) | One coach-chunk grant |
/// | [`deactivate_chunks`](Store::deactivate_chunks) | Soft-delete a source's chunks |
#[async_trait]
pub trait Store: Send + Sync {
    /// Look up an uploaded (URL-less) source by content hash.
    async fn find_source_by_hash(&self, content_hash: &str) -> Result<Option<ContentSource>>;

    /// Look up a source by canonical source URL.
    async fn find_source_by_url(&self, source_url: &str) -> Result<Option<ContentSource>>;

    /// Retrieve a source by id.
    async fn get_source(&self, id: &str) -> Result<Option<ContentSource>>;

    /// Number of chunks of `source_id` with `is_active = true`.
    async fn count_active_chunks(&self, source_id: &str) -> Result<u64>;

    /// Insert a new source and return it with its assigned id.
    async fn insert_source(&self, source: &NewContentSource) -> Result<ContentSource>;

    /// Overwrite title, content, hash, URL, and metadata of `previous` so
    /// it can host a new ingestion attempt.
    ///
    /// The claim is atomic: it fails with [`UniqueViolation`] if the row
    /// was modified after `previous` was read or has active chunks.
    async fn reset_source(
        &self,
        previous: &ContentSource,
        source: &NewContentSource,
    ) -> Result<ContentSource>;

    /// Replace the metadata of a source.
    async fn update_source_metadata(&self, id: &str, metadata: &SourceMetadata) -> Result<()>;

    /// `1 + max(version)` over all chunks of the source, or `1` if none.
    async fn next_chunk_version(&self, source_id: &str) -> Result<u32>;

    /// Insert all chunks atomically. Either every chunk is stored or none.
    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<()>;

    /// Insert a single coach access grant.
    async fn insert_access_grant(&self, grant: &CoachAccessGrant) -> Result<()>;

    /// All chunks of a source, ordered by version then chunk index.
    async fn list_chunks(&self, source_id: &str) -> Result<Vec<Chunk>>;

    /// All grants attached to chunks of a source.
    async fn list_grants(&self, source_id: &str) -> Result<Vec<CoachAccessGrant>>;

    /// Mark every active chunk of a source inactive. Returns how many changed.
    async fn deactivate_chunks(&self, source_id: &str) -> Result<u64>;

    /// Aggregate counts across the whole store.
    async fn stats(&self) -> Result<StoreStats>;
}
