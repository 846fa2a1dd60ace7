//! Core data models for the ingestion pipeline.
//!
//! A [`ContentSource`] is one ingested document or video. Its text is split
//! into [`Chunk`]s, each carrying an embedding vector, and every persisted
//! chunk is made visible to coaches through [`CoachAccessGrant`]s.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ordered permission level of a coach-chunk grant (`free < premium < pro`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessTier {
    Free,
    Premium,
    Pro,
}

impl AccessTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessTier::Free => "free",
            AccessTier::Premium => "premium",
            AccessTier::Pro => "pro",
        }
    }
}

impl fmt::Display for AccessTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessTier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(AccessTier::Free),
            "premium" => Ok(AccessTier::Premium),
            "pro" => Ok(AccessTier::Pro),
            other => Err(anyhow!(
                "invalid access tier '{}': expected free, premium, or pro",
                other
            )),
        }
    }
}

/// How a [`ContentSource`] entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// An uploaded file. Deduplicated by content hash.
    #[default]
    Document,
    /// A fetched video transcript. Deduplicated by canonical URL.
    Url,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Document => "document",
            SourceType::Url => "url",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "document" => Ok(SourceType::Document),
            "url" => Ok(SourceType::Url),
            other => Err(anyhow!(
                "invalid source type '{}': expected document or url",
                other
            )),
        }
    }
}

/// Processing status of one ingestion attempt.
///
/// `pending → {completed | partial | failed}`; never back to `pending`
/// within the same attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    #[default]
    Pending,
    Completed,
    Partial,
    Failed,
}

impl ProcessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessStatus::Pending => "pending",
            ProcessStatus::Completed => "completed",
            ProcessStatus::Partial => "partial",
            ProcessStatus::Failed => "failed",
        }
    }

    /// Status for an attempt that created `created` chunks and recorded
    /// `failures` per-chunk errors.
    pub fn from_outcome(created: usize, failures: usize) -> Self {
        match (created, failures) {
            (0, _) => ProcessStatus::Failed,
            (_, 0) => ProcessStatus::Completed,
            _ => ProcessStatus::Partial,
        }
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chunk whose embedding call failed. Recorded on the source, never
/// persisted as a chunk row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkFailure {
    pub chunk_index: usize,
    pub error: String,
}

/// Facts accumulated on a [`ContentSource`] over its ingestion lifecycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceMetadata {
    pub process_status: ProcessStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub byte_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub char_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub word_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub looks_like_markdown: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playlist_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_version: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks_created: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ChunkFailure>,
    /// Fatal error that stopped the attempt (e.g. chunk bulk-insert failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

impl SourceMetadata {
    /// Record the outcome of the chunk/embed/persist stages and derive the
    /// terminal status from it.
    pub fn reconcile(
        &mut self,
        chunks_created: usize,
        total_chunks: usize,
        errors: Vec<ChunkFailure>,
    ) -> ProcessStatus {
        self.process_status = ProcessStatus::from_outcome(chunks_created, errors.len());
        self.chunks_created = Some(chunks_created);
        self.total_chunks = Some(total_chunks);
        self.errors = errors;
        self.processed_at = Some(Utc::now());
        self.process_status
    }

    /// Mark the attempt as failed with a fatal error message.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.process_status = ProcessStatus::Failed;
        self.error = Some(message.into());
        self.processed_at = Some(Utc::now());
    }
}

/// Fields needed to create (or re-initialize) a [`ContentSource`].
#[derive(Debug, Clone)]
pub struct NewContentSource {
    pub title: String,
    pub source_type: SourceType,
    pub file_name: Option<String>,
    pub source_url: Option<String>,
    pub content_hash: String,
    pub content: String,
    pub metadata: SourceMetadata,
}

/// Persisted record of one ingested document or video.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentSource {
    pub id: String,
    pub title: String,
    pub source_type: SourceType,
    pub file_name: Option<String>,
    pub source_url: Option<String>,
    pub content_hash: String,
    #[serde(skip_serializing)]
    pub content: String,
    pub metadata: SourceMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Position facts recorded on each chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    pub char_length: usize,
    pub byte_length: usize,
    /// Character offset of the chunk within the source text.
    pub offset: usize,
}

/// One embedded slice of a source's text.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub id: String,
    pub source_id: String,
    pub title: String,
    pub content: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    #[serde(skip_serializing)]
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
    pub version: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Derive a chunk title: `"{title} - Part {i+1}/{n}"` when `n > 1`.
pub fn chunk_title(source_title: &str, index: usize, total: usize) -> String {
    if total > 1 {
        format!("{} - Part {}/{}", source_title, index + 1, total)
    } else {
        source_title.to_string()
    }
}

/// A caller-requested `(coach, tier)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoachAccess {
    pub coach_id: String,
    pub access_tier: AccessTier,
}

impl FromStr for CoachAccess {
    type Err = anyhow::Error;

    /// Parses `coachId:tier` (e.g. `carnivore:pro`).
    fn from_str(s: &str) -> Result<Self> {
        let (coach, tier) = s
            .rsplit_once(':')
            .ok_or_else(|| anyhow!("invalid coach access '{}': expected <coachId>:<tier>", s))?;
        let coach = coach.trim();
        if coach.is_empty() {
            return Err(anyhow!("invalid coach access '{}': empty coach id", s));
        }
        Ok(CoachAccess {
            coach_id: coach.to_string(),
            access_tier: tier.parse()?,
        })
    }
}

/// Join row granting a coach access to one chunk at a tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoachAccessGrant {
    pub chunk_id: String,
    pub coach_id: String,
    pub access_tier: AccessTier,
}
