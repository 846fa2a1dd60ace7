//! Scripted collaborators shared by the pipeline and HTTP tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use coach_rag::ingest::{FileUpload, IngestOptions, Ingestor};
use coach_rag_core::embedding::EmbeddingProvider;
use coach_rag_core::models::{
    AccessTier, Chunk, CoachAccess, CoachAccessGrant, ContentSource, NewContentSource,
    SourceMetadata,
};
use coach_rag_core::store::memory::InMemoryStore;
use coach_rag_core::store::{Store, StoreStats};
use coach_rag_core::video::{TranscriptError, VideoInfo, VideoService};

// ============ Embedding ============

/// Embeds every text as a 3-dim vector; fails any text containing one of
/// the configured markers. Tracks calls and peak concurrency.
#[derive(Default)]
pub struct ScriptedEmbedder {
    pub fail_markers: Vec<String>,
    pub fail_all: bool,
    pub delay: Option<Duration>,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl ScriptedEmbedder {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn failing_on(marker: &str) -> Self {
        Self {
            fail_markers: vec![marker.to_string()],
            ..Default::default()
        }
    }

    /// Every call sleeps for `delay` before answering.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn always_failing() -> Self {
        Self {
            fail_all: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for ScriptedEmbedder {
    fn model_name(&self) -> &str {
        "scripted"
    }

    fn dims(&self) -> usize {
        3
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_all || self.fail_markers.iter().any(|m| text.contains(m.as_str())) {
            bail!("embedding service returned 503");
        }
        Ok(vec![text.chars().count() as f32, 0.5, 1.0])
    }
}

// ============ Store ============

/// Wraps [`InMemoryStore`] with switchable failures.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: InMemoryStore,
    /// Grants for these coach ids fail.
    pub failing_coaches: Mutex<Vec<String>>,
    pub fail_chunk_insert: AtomicBool,
    pub fail_metadata_updates: AtomicBool,
    /// While positive, dedup lookups report "not found" and decrement.
    pub hidden_lookups: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_grants_for(&self, coach_id: &str) {
        if let Ok(mut coaches) = self.failing_coaches.lock() {
            coaches.push(coach_id.to_string());
        }
    }

    fn hide_lookup(&self) -> bool {
        self.hidden_lookups
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn find_source_by_hash(&self, content_hash: &str) -> Result<Option<ContentSource>> {
        if self.hide_lookup() {
            return Ok(None);
        }
        self.inner.find_source_by_hash(content_hash).await
    }

    async fn find_source_by_url(&self, source_url: &str) -> Result<Option<ContentSource>> {
        if self.hide_lookup() {
            return Ok(None);
        }
        self.inner.find_source_by_url(source_url).await
    }

    async fn get_source(&self, id: &str) -> Result<Option<ContentSource>> {
        self.inner.get_source(id).await
    }

    async fn count_active_chunks(&self, source_id: &str) -> Result<u64> {
        self.inner.count_active_chunks(source_id).await
    }

    async fn insert_source(&self, source: &NewContentSource) -> Result<ContentSource> {
        self.inner.insert_source(source).await
    }

    async fn reset_source(
        &self,
        previous: &ContentSource,
        source: &NewContentSource,
    ) -> Result<ContentSource> {
        self.inner.reset_source(previous, source).await
    }

    async fn update_source_metadata(&self, id: &str, metadata: &SourceMetadata) -> Result<()> {
        if self.fail_metadata_updates.load(Ordering::SeqCst) {
            bail!("database is locked");
        }
        self.inner.update_source_metadata(id, metadata).await
    }

    async fn next_chunk_version(&self, source_id: &str) -> Result<u32> {
        self.inner.next_chunk_version(source_id).await
    }

    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        if self.fail_chunk_insert.load(Ordering::SeqCst) {
            return Err(anyhow!("disk I/O error"));
        }
        self.inner.insert_chunks(chunks).await
    }

    async fn insert_access_grant(&self, grant: &CoachAccessGrant) -> Result<()> {
        let failing = self
            .failing_coaches
            .lock()
            .map(|c| c.contains(&grant.coach_id))
            .unwrap_or(false);
        if failing {
            bail!("foreign key constraint failed for coach {}", grant.coach_id);
        }
        self.inner.insert_access_grant(grant).await
    }

    async fn list_chunks(&self, source_id: &str) -> Result<Vec<Chunk>> {
        self.inner.list_chunks(source_id).await
    }

    async fn list_grants(&self, source_id: &str) -> Result<Vec<CoachAccessGrant>> {
        self.inner.list_grants(source_id).await
    }

    async fn deactivate_chunks(&self, source_id: &str) -> Result<u64> {
        self.inner.deactivate_chunks(source_id).await
    }

    async fn stats(&self) -> Result<StoreStats> {
        self.inner.stats().await
    }
}

// ============ Video platform ============

/// Scripted playlists, video details and transcripts. A video id with no
/// details entry is reported as removed; one with details but no
/// transcript entry has no transcript.
#[derive(Default)]
pub struct FakeVideos {
    pub playlists: HashMap<String, Vec<String>>,
    pub details: HashMap<String, VideoInfo>,
    pub transcripts: HashMap<String, String>,
    pub fail_playlists: bool,
    pub transcript_calls: AtomicUsize,
}

impl FakeVideos {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_video(mut self, video_id: &str, title: &str, transcript: Option<&str>) -> Self {
        self.details.insert(
            video_id.to_string(),
            VideoInfo {
                video_id: video_id.to_string(),
                title: title.to_string(),
                duration_seconds: Some(600),
                channel_title: Some("Coach Channel".to_string()),
            },
        );
        if let Some(text) = transcript {
            self.transcripts.insert(video_id.to_string(), text.to_string());
        }
        self
    }

    pub fn with_playlist(mut self, playlist_id: &str, video_ids: &[&str]) -> Self {
        self.playlists.insert(
            playlist_id.to_string(),
            video_ids.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    pub fn transcript_calls(&self) -> usize {
        self.transcript_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoService for FakeVideos {
    async fn playlist_items(&self, playlist_id: &str, max_items: usize) -> Result<Vec<String>> {
        if self.fail_playlists {
            bail!("YouTube API error 403: quota exceeded");
        }
        let mut ids = self
            .playlists
            .get(playlist_id)
            .cloned()
            .ok_or_else(|| anyhow!("playlist not found: {}", playlist_id))?;
        ids.truncate(max_items);
        Ok(ids)
    }

    async fn video_details(&self, video_id: &str) -> Result<Option<VideoInfo>> {
        Ok(self.details.get(video_id).cloned())
    }

    async fn transcript(&self, video_id: &str) -> Result<String, TranscriptError> {
        self.transcript_calls.fetch_add(1, Ordering::SeqCst);
        self.transcripts
            .get(video_id)
            .cloned()
            .ok_or_else(|| TranscriptError::Unavailable(video_id.to_string()))
    }
}

// ============ Helpers ============

pub fn ingestor(
    store: Arc<dyn Store>,
    embedder: Arc<dyn EmbeddingProvider>,
    videos: Arc<dyn VideoService>,
) -> Ingestor {
    Ingestor::new(
        store,
        embedder,
        videos,
        IngestOptions {
            max_concurrency: 4,
            ..Default::default()
        },
    )
}

pub fn coach(id: &str, tier: AccessTier) -> CoachAccess {
    CoachAccess {
        coach_id: id.to_string(),
        access_tier: tier,
    }
}

/// 2,500 characters of plain text: four windows at the default size.
pub fn long_text() -> String {
    "a".repeat(2500)
}

/// 2,500 characters with `marker` at offset 2000, which only the third
/// window (`[1600, 2500)`) contains.
pub fn long_text_with_marker(marker: &str) -> String {
    let mut text = "a".repeat(2000);
    text.push_str(marker);
    text.push_str(&"a".repeat(2500 - 2000 - marker.chars().count()));
    text
}

pub fn text_upload(name: &str, text: &str) -> FileUpload {
    FileUpload {
        file_name: Some(name.to_string()),
        mime_type: Some("text/plain".to_string()),
        bytes: text.as_bytes().to_vec(),
        ..Default::default()
    }
}

/// Transcript long enough for two windows.
pub fn transcript_text(topic: &str) -> String {
    format!("{} ", topic).repeat(1500 / (topic.len() + 1) + 1)
}
