//! Video platform collaborator trait.
//!
//! The YouTube flow needs three things from the platform: the video IDs of
//! a playlist, per-video details, and a transcript. [`VideoService`]
//! abstracts those so the orchestrator can be driven by a fake in tests.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Details of a single video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfo {
    pub video_id: String,
    pub title: String,
    pub duration_seconds: Option<u64>,
    pub channel_title: Option<String>,
}

/// Why a transcript could not be obtained.
#[derive(Debug, Error)]
pub enum TranscriptError {
    /// The video exists but has no transcript in the requested language.
    #[error("no transcript available for video {0}")]
    Unavailable(String),
    /// The video is private, deleted or otherwise not reachable.
    #[error("video {0} is unavailable or has been removed")]
    VideoRemoved(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[async_trait]
pub trait VideoService: Send + Sync {
    /// Video IDs in playlist order, capped at `max_items`.
    async fn playlist_items(&self, playlist_id: &str, max_items: usize) -> Result<Vec<String>>;

    /// Details for one video, `None` when the platform does not know it.
    async fn video_details(&self, video_id: &str) -> Result<Option<VideoInfo>>;

    /// Plain transcript text for one video.
    async fn transcript(&self, video_id: &str) -> Result<String, TranscriptError>;
}
