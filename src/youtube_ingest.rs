//! YouTube ingestion flow.
//!
//! Resolves a playlist, video id or URL into an ordered list of video ids
//! and processes them one at a time. Each video is deduplicated by its
//! canonical URL *before* its transcript is fetched; a failing video is
//! recorded in its own [`VideoOutcome`] and never stops the rest.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use coach_rag_core::dedup::{check_duplicate, DedupKey, ExistingDocument};
use coach_rag_core::hash::content_hash;
use coach_rag_core::models::{CoachAccess, NewContentSource, SourceMetadata, SourceType};
use coach_rag_core::video::TranscriptError;
use coach_rag_core::youtube_url::{
    canonical_video_url, extract_playlist_id, extract_video_id, is_valid_video_id,
};

use crate::config::Config;
use crate::error::IngestError;
use crate::extract::analyze_structure;
use crate::ingest::{apply_structure, require_coaches, Ingestor, PreparedSource, TailOutcome};

/// What the caller asked to process. At least one field must resolve.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YoutubeRequest {
    pub playlist_id: Option<String>,
    pub video_id: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum YoutubeTarget {
    Playlist(String),
    Video(String),
}

impl YoutubeRequest {
    /// Resolve to a target. Explicit ids win over the URL; within a URL a
    /// `list=` parameter wins over the video id.
    pub fn resolve(&self) -> Result<YoutubeTarget, IngestError> {
        let non_empty = |s: &Option<String>| {
            s.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        if let Some(playlist) = non_empty(&self.playlist_id) {
            return Ok(YoutubeTarget::Playlist(playlist));
        }
        if let Some(video) = non_empty(&self.video_id) {
            return extract_video_id(&video)
                .map(YoutubeTarget::Video)
                .ok_or_else(|| IngestError::validation(format!("invalid video id: {}", video)));
        }
        if let Some(url) = non_empty(&self.url) {
            if let Some(playlist) = extract_playlist_id(&url) {
                return Ok(YoutubeTarget::Playlist(playlist));
            }
            return extract_video_id(&url)
                .map(YoutubeTarget::Video)
                .ok_or_else(|| {
                    IngestError::validation(format!("no playlist or video id found in {}", url))
                });
        }
        Err(IngestError::validation(
            "one of playlistId, videoId or url is required",
        ))
    }
}

/// Per-video result of the YouTube flow.
#[derive(Debug, Clone)]
pub enum VideoOutcome {
    /// An active source already exists for the canonical URL.
    Duplicate {
        video_id: String,
        existing: ExistingDocument,
    },
    /// Metadata, transcript, embedding or persistence failed for this video.
    Failed {
        video_id: String,
        title: Option<String>,
        error: String,
    },
    Ingested {
        video_id: String,
        title: String,
        source_id: String,
        chunks_created: usize,
    },
}

/// JSON shape of one entry in the `results` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoResult {
    pub video_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks_created: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_duplicate: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VideoOutcome {
    pub fn video_id(&self) -> &str {
        match self {
            VideoOutcome::Duplicate { video_id, .. }
            | VideoOutcome::Failed { video_id, .. }
            | VideoOutcome::Ingested { video_id, .. } => video_id,
        }
    }

    pub fn to_result(&self) -> VideoResult {
        match self {
            VideoOutcome::Duplicate { video_id, existing } => VideoResult {
                video_id: video_id.clone(),
                title: Some(existing.title.clone()),
                success: false,
                chunks_created: None,
                document_id: Some(existing.id.clone()),
                is_duplicate: Some(true),
                error: Some("video has already been processed".to_string()),
            },
            VideoOutcome::Failed {
                video_id,
                title,
                error,
            } => VideoResult {
                video_id: video_id.clone(),
                title: title.clone(),
                success: false,
                chunks_created: None,
                document_id: None,
                is_duplicate: None,
                error: Some(error.clone()),
            },
            VideoOutcome::Ingested {
                video_id,
                title,
                source_id,
                chunks_created,
            } => VideoResult {
                video_id: video_id.clone(),
                title: Some(title.clone()),
                success: true,
                chunks_created: Some(*chunks_created),
                document_id: Some(source_id.clone()),
                is_duplicate: None,
                error: None,
            },
        }
    }
}

/// Counts over one YouTube request. `total = successful + failed + duplicates`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YoutubeSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub duplicates: usize,
}

impl YoutubeSummary {
    pub fn from_outcomes(outcomes: &[VideoOutcome]) -> Self {
        let mut summary = YoutubeSummary {
            total: outcomes.len(),
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome {
                VideoOutcome::Ingested { .. } => summary.successful += 1,
                VideoOutcome::Failed { .. } => summary.failed += 1,
                VideoOutcome::Duplicate { .. } => summary.duplicates += 1,
            }
        }
        summary
    }
}

#[derive(Debug, Clone)]
pub enum YoutubeOutcome {
    /// A single requested video is already ingested.
    Duplicate(ExistingDocument),
    Processed {
        videos: Vec<VideoOutcome>,
        summary: YoutubeSummary,
    },
}

/// Pre-flight duplicate state of one video.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStatus {
    pub video_id: String,
    pub source_url: String,
    pub exists: bool,
    pub is_duplicate: bool,
    pub active_chunk_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<ExistingDocument>,
}

impl Ingestor {
    /// Ingest a single video or every video of a playlist. Videos are
    /// processed one at a time and a failure never stops the rest.
    pub async fn process_youtube(
        &self,
        request: &YoutubeRequest,
        coach_access: &[CoachAccess],
    ) -> Result<YoutubeOutcome, IngestError> {
        let target = request.resolve()?;
        require_coaches(coach_access)?;

        let (playlist_id, video_ids) = match &target {
            YoutubeTarget::Video(id) => (None, vec![id.clone()]),
            YoutubeTarget::Playlist(id) => {
                let ids = self
                    .videos
                    .playlist_items(id, self.options.max_playlist_items)
                    .await
                    .map_err(IngestError::Upstream)?;
                info!(playlist_id = %id, videos = ids.len(), "playlist resolved");
                (Some(id.clone()), ids)
            }
        };

        let mut videos = Vec::with_capacity(video_ids.len());
        for video_id in &video_ids {
            let outcome = self
                .process_video(video_id, playlist_id.as_deref(), coach_access)
                .await;
            if let VideoOutcome::Failed { error, .. } = &outcome {
                warn!(video_id = %video_id, error = %error, "video ingestion failed");
            }
            videos.push(outcome);
        }

        if let (YoutubeTarget::Video(_), [VideoOutcome::Duplicate { existing, .. }]) =
            (&target, videos.as_slice())
        {
            return Ok(YoutubeOutcome::Duplicate(existing.clone()));
        }

        let summary = YoutubeSummary::from_outcomes(&videos);
        info!(
            total = summary.total,
            successful = summary.successful,
            failed = summary.failed,
            duplicates = summary.duplicates,
            "youtube processing finished"
        );
        Ok(YoutubeOutcome::Processed { videos, summary })
    }

    async fn process_video(
        &self,
        video_id: &str,
        playlist_id: Option<&str>,
        coach_access: &[CoachAccess],
    ) -> VideoOutcome {
        let failed = |title: Option<String>, error: String| VideoOutcome::Failed {
            video_id: video_id.to_string(),
            title,
            error,
        };

        if !is_valid_video_id(video_id) {
            return failed(None, format!("invalid video id: {}", video_id));
        }

        // Dedup before any transcript work.
        let source_url = canonical_video_url(video_id);
        let key = DedupKey::SourceUrl(source_url.clone());
        let check = match check_duplicate(self.store.as_ref(), &key).await {
            Ok(check) => check,
            Err(e) => return failed(None, IngestError::Dedup(e).to_string()),
        };
        if check.is_duplicate {
            debug!(video_id, "video is a duplicate");
            if let Some(existing) = check.existing_document() {
                return VideoOutcome::Duplicate {
                    video_id: video_id.to_string(),
                    existing,
                };
            }
        }

        let info = match self.videos.video_details(video_id).await {
            Ok(Some(info)) => info,
            Ok(None) => {
                return failed(None, TranscriptError::VideoRemoved(video_id.to_string()).to_string())
            }
            Err(e) => return failed(None, IngestError::Upstream(e).to_string()),
        };

        let transcript = match self.videos.transcript(video_id).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                return failed(
                    Some(info.title),
                    TranscriptError::Unavailable(video_id.to_string()).to_string(),
                )
            }
            Err(e) => return failed(Some(info.title), e.to_string()),
        };

        let mut metadata = SourceMetadata {
            video_id: Some(video_id.to_string()),
            playlist_id: playlist_id.map(str::to_string),
            channel_title: info.channel_title.clone(),
            duration_seconds: info.duration_seconds,
            byte_size: Some(transcript.len() as u64),
            ..Default::default()
        };
        apply_structure(&mut metadata, &analyze_structure(&transcript));

        let prepared = PreparedSource {
            new_source: NewContentSource {
                title: info.title.clone(),
                source_type: SourceType::Url,
                file_name: None,
                source_url: Some(source_url),
                content_hash: content_hash(transcript.as_bytes()),
                content: transcript,
                metadata,
            },
            reuse: check.reusable().cloned(),
            dedup_key: key,
        };

        match self.process_source(prepared, coach_access).await {
            Ok(TailOutcome::Ingested(summary)) => VideoOutcome::Ingested {
                video_id: video_id.to_string(),
                title: summary.title,
                source_id: summary.source_id,
                chunks_created: summary.chunks_created,
            },
            Ok(TailOutcome::Conflict(existing)) => VideoOutcome::Duplicate {
                video_id: video_id.to_string(),
                existing,
            },
            Err(e) => failed(Some(info.title), e.to_string()),
        }
    }

    /// Report whether a video (id or URL) is already ingested.
    pub async fn video_status(&self, input: &str) -> Result<VideoStatus, IngestError> {
        let video_id = extract_video_id(input)
            .ok_or_else(|| IngestError::validation(format!("no video id found in {}", input)))?;
        let source_url = canonical_video_url(&video_id);
        let check = check_duplicate(self.store.as_ref(), &DedupKey::SourceUrl(source_url.clone()))
            .await
            .map_err(IngestError::Dedup)?;

        Ok(VideoStatus {
            video_id,
            source_url,
            exists: check.existing.is_some(),
            is_duplicate: check.is_duplicate,
            active_chunk_count: check.active_chunk_count,
            document: check.existing_document(),
        })
    }
}

/// CLI entry point for `ragctl youtube`.
pub async fn run_youtube(
    config: &Config,
    request: &YoutubeRequest,
    coach_access: &[CoachAccess],
) -> anyhow::Result<()> {
    let ingestor = Ingestor::from_config(config).await?;

    match ingestor.process_youtube(request, coach_access).await? {
        YoutubeOutcome::Duplicate(existing) => {
            println!(
                "duplicate  {}  already processed as \"{}\" ({} chunks)",
                existing.id, existing.title, existing.chunk_count
            );
        }
        YoutubeOutcome::Processed { videos, summary } => {
            for video in &videos {
                match video {
                    VideoOutcome::Ingested {
                        video_id,
                        title,
                        source_id,
                        chunks_created,
                    } => println!(
                        "ingested   {}  {}  {} chunk(s)  {}",
                        video_id, source_id, chunks_created, title
                    ),
                    VideoOutcome::Duplicate { video_id, existing } => {
                        println!("duplicate  {}  {}  {}", video_id, existing.id, existing.title)
                    }
                    VideoOutcome::Failed {
                        video_id, error, ..
                    } => println!("failed     {}  {}", video_id, error),
                }
            }
            println!();
            println!(
                "total {}  successful {}  failed {}  duplicates {}",
                summary.total, summary.successful, summary.failed, summary.duplicates
            );
            if summary.total > 0 && summary.successful == 0 && summary.failed > 0 {
                anyhow::bail!("no videos could be processed");
            }
        }
    }
    Ok(())
}

/// CLI entry point for `ragctl status`: print a video's duplicate state as JSON.
pub async fn run_video_status(config: &Config, input: &str) -> anyhow::Result<()> {
    let ingestor = Ingestor::from_config(config).await?;
    let status = ingestor.video_status(input).await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
