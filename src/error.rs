//! Ingestion error taxonomy.
//!
//! Duplicates are not errors: they come back as a regular outcome. The
//! variants here are the ways an ingestion request can end without
//! producing chunks.

use thiserror::Error;

use coach_rag_core::models::ChunkFailure;

use crate::extract::ExtractError;

#[derive(Debug, Error)]
pub enum IngestError {
    /// Rejected before any external call or write.
    #[error("{0}")]
    Validation(String),

    /// The upload could not be turned into text.
    #[error(transparent)]
    Extraction(#[from] ExtractError),

    /// The duplicate lookup itself failed. Fatal for the item.
    #[error("duplicate check failed: {0:#}")]
    Dedup(anyhow::Error),

    /// A datastore write failed for a reason other than a uniqueness
    /// conflict. `source_id` is set once the source row exists.
    #[error("{message}")]
    Persistence {
        source_id: Option<String>,
        message: String,
    },

    /// Every chunk's embedding call failed; the source is marked failed.
    #[error("no chunks could be embedded for source {source_id} ({} errors)", errors.len())]
    NoChunksEmbedded {
        source_id: String,
        errors: Vec<ChunkFailure>,
    },

    /// Playlist or video metadata could not be resolved.
    #[error("upstream service failed: {0:#}")]
    Upstream(anyhow::Error),
}

impl IngestError {
    pub fn validation(message: impl Into<String>) -> Self {
        IngestError::Validation(message.into())
    }

    pub(crate) fn persistence(source_id: Option<&str>, err: &anyhow::Error) -> Self {
        IngestError::Persistence {
            source_id: source_id.map(str::to_string),
            message: format!("{:#}", err),
        }
    }

    /// Stable machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::Validation(_) => "validation_error",
            IngestError::Extraction(ExtractError::UnsupportedContentType(_)) => {
                "unsupported_content_type"
            }
            IngestError::Extraction(ExtractError::Empty) => "no_extractable_text",
            IngestError::Extraction(_) => "extraction_failed",
            IngestError::Dedup(_) => "dedup_failed",
            IngestError::Persistence { .. } => "persistence_failed",
            IngestError::NoChunksEmbedded { .. } => "embedding_failed",
            IngestError::Upstream(_) => "upstream_error",
        }
    }
}
