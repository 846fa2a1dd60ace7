//! Ingestion orchestration.
//!
//! [`Ingestor`] drives both entry flows (file upload here, YouTube in
//! [`crate::youtube_ingest`]) through the same tail:
//!
//! ```text
//! claim source → chunk → embed (concurrent) → persist chunks → assign access → reconcile status
//! ```
//!
//! Collaborators are injected as trait objects so tests can substitute
//! scripted doubles for the datastore, embedding service and video
//! platform.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use coach_rag_core::access::{assign_access, AccessResult};
use coach_rag_core::chunk::{chunk_text, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use coach_rag_core::dedup::{check_duplicate, DedupKey, ExistingDocument};
use coach_rag_core::embedding::{embed_chunks, EmbeddingProvider};
use coach_rag_core::hash::content_hash;
use coach_rag_core::models::{
    chunk_title, Chunk, ChunkFailure, ChunkMetadata, CoachAccess, ContentSource, NewContentSource,
    ProcessStatus, SourceMetadata, SourceType,
};
use coach_rag_core::store::{is_unique_violation, Store};
use coach_rag_core::video::VideoService;

use crate::config::Config;
use crate::db;
use crate::embedding::create_provider;
use crate::error::IngestError;
use crate::extract::{analyze_structure, extract_text, resolve_content_type, TextStructure};
use crate::migrate;
use crate::progress::{ProgressEvent, ProgressMode};
use crate::scan::collect_upload_files;
use crate::sqlite_store::SqliteStore;
use crate::youtube::YoutubeClient;

/// Tunables of one [`Ingestor`].
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Maximum embedding calls in flight per source.
    pub max_concurrency: usize,
    pub max_file_bytes: u64,
    pub max_playlist_items: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            max_concurrency: 8,
            max_file_bytes: 25 * 1024 * 1024,
            max_playlist_items: 200,
        }
    }
}

impl IngestOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk_size: config.chunking.chunk_size,
            chunk_overlap: config.chunking.chunk_overlap,
            max_concurrency: config.embedding.max_concurrency,
            max_file_bytes: config.upload.max_file_bytes,
            max_playlist_items: config.youtube.max_playlist_items,
        }
    }
}

/// One uploaded file.
#[derive(Debug, Clone, Default)]
pub struct FileUpload {
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
    /// Overrides the title derived from the file name.
    pub title: Option<String>,
    pub source_type: SourceType,
}

impl FileUpload {
    /// Read a file from disk, keeping its base name.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        Ok(Self {
            file_name: path.file_name().map(|n| n.to_string_lossy().to_string()),
            bytes: std::fs::read(path)?,
            ..Default::default()
        })
    }

    fn derived_title(&self) -> String {
        if let Some(title) = self.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            return title.to_string();
        }
        self.file_name
            .as_deref()
            .and_then(|n| Path::new(n).file_stem())
            .map(|s| s.to_string_lossy().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "Untitled document".to_string())
    }
}

/// Result of a completed ingestion attempt for one source.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    #[serde(rename = "id")]
    pub source_id: String,
    #[serde(rename = "name")]
    pub title: String,
    pub chunks_created: usize,
    pub total_chunks: usize,
    pub status: ProcessStatus,
    pub version: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ChunkFailure>,
    pub access: Vec<AccessResult>,
}

/// Outcome of a file upload.
#[derive(Debug, Clone)]
pub enum UploadOutcome {
    Created(IngestSummary),
    Duplicate(ExistingDocument),
}

/// Outcome of the shared tail.
pub(crate) enum TailOutcome {
    Ingested(IngestSummary),
    /// The dedup key was claimed concurrently by another request.
    Conflict(ExistingDocument),
}

/// A source ready to be claimed and processed.
pub(crate) struct PreparedSource {
    pub new_source: NewContentSource,
    /// Matched source with zero active chunks, reused instead of inserting.
    pub reuse: Option<ContentSource>,
    pub dedup_key: DedupKey,
}

pub struct Ingestor {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) embedder: Arc<dyn EmbeddingProvider>,
    pub(crate) videos: Arc<dyn VideoService>,
    pub(crate) options: IngestOptions,
}

pub(crate) fn require_coaches(coach_access: &[CoachAccess]) -> Result<(), IngestError> {
    if coach_access.is_empty() {
        return Err(IngestError::validation(
            "at least one coach must be selected (coachAccess is empty)",
        ));
    }
    let mut seen = HashSet::new();
    for access in coach_access {
        if !seen.insert(access.coach_id.as_str()) {
            return Err(IngestError::validation(format!(
                "coach '{}' is listed more than once in coachAccess",
                access.coach_id
            )));
        }
    }
    Ok(())
}

/// How long a `pending` attempt keeps its source claimed. After that the
/// attempt is presumed dead and the source may be reused.
const PENDING_CLAIM_SECS: i64 = 15 * 60;

/// Whether `source` is held by another attempt that has not finished.
pub(crate) fn attempt_in_flight(source: &ContentSource) -> bool {
    source.metadata.process_status == ProcessStatus::Pending
        && Utc::now() - source.updated_at < chrono::Duration::seconds(PENDING_CLAIM_SECS)
}

pub(crate) fn apply_structure(metadata: &mut SourceMetadata, structure: &TextStructure) {
    metadata.char_count = Some(structure.char_count);
    metadata.word_count = Some(structure.word_count);
    metadata.line_count = Some(structure.line_count);
    metadata.heading_count = Some(structure.heading_count);
    metadata.looks_like_markdown = Some(structure.looks_like_markdown);
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn Store>,
        embedder: Arc<dyn EmbeddingProvider>,
        videos: Arc<dyn VideoService>,
        options: IngestOptions,
    ) -> Self {
        Self {
            store,
            embedder,
            videos,
            options,
        }
    }

    /// Wire the SQLite store, the configured embedding provider and the
    /// YouTube client. The schema is applied if missing.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply_schema(&pool).await?;
        Ok(Self::new(
            Arc::new(SqliteStore::new(pool)),
            create_provider(&config.embedding)?,
            Arc::new(YoutubeClient::new(&config.youtube)?),
            IngestOptions::from_config(config),
        ))
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Ingest one uploaded file: validate, dedup by content hash, extract
    /// text, then chunk, embed, persist and grant access.
    pub async fn ingest_file(
        &self,
        upload: FileUpload,
        coach_access: &[CoachAccess],
    ) -> Result<UploadOutcome, IngestError> {
        if upload.bytes.is_empty() {
            return Err(IngestError::validation("a non-empty file is required"));
        }
        require_coaches(coach_access)?;
        if upload.bytes.len() as u64 > self.options.max_file_bytes {
            return Err(IngestError::validation(format!(
                "file is {} bytes, limit is {}",
                upload.bytes.len(),
                self.options.max_file_bytes
            )));
        }

        let hash = content_hash(&upload.bytes);
        let key = DedupKey::ContentHash(hash.clone());
        let check = check_duplicate(self.store.as_ref(), &key)
            .await
            .map_err(IngestError::Dedup)?;
        if check.is_duplicate {
            debug!(content_hash = %hash, "upload is a duplicate");
            if let Some(existing) = check.existing_document() {
                return Ok(UploadOutcome::Duplicate(existing));
            }
        }

        let content_type =
            resolve_content_type(upload.mime_type.as_deref(), upload.file_name.as_deref())
                .ok_or_else(|| {
                    IngestError::validation(format!(
                        "cannot determine a supported content type for {}",
                        upload.file_name.as_deref().unwrap_or("upload")
                    ))
                })?;
        let text = extract_text(&upload.bytes, &content_type)?;

        let mut metadata = SourceMetadata {
            original_file_name: upload.file_name.clone(),
            mime_type: Some(content_type),
            byte_size: Some(upload.bytes.len() as u64),
            ..Default::default()
        };
        apply_structure(&mut metadata, &analyze_structure(&text));

        let prepared = PreparedSource {
            new_source: NewContentSource {
                title: upload.derived_title(),
                source_type: upload.source_type,
                file_name: upload.file_name.clone(),
                source_url: None,
                content_hash: hash,
                content: text,
                metadata,
            },
            reuse: check.reusable().cloned(),
            dedup_key: key,
        };

        match self.process_source(prepared, coach_access).await? {
            TailOutcome::Ingested(summary) => Ok(UploadOutcome::Created(summary)),
            TailOutcome::Conflict(existing) => Ok(UploadOutcome::Duplicate(existing)),
        }
    }

    /// Insert (or reuse) the source row. A uniqueness conflict is
    /// reinterpreted as a duplicate of whoever won the race.
    async fn claim_source(
        &self,
        prepared: &PreparedSource,
    ) -> Result<Result<ContentSource, ExistingDocument>, IngestError> {
        if let Some(previous) = prepared.reuse.as_ref() {
            if attempt_in_flight(previous) {
                debug!(source_id = %previous.id, "previous attempt still pending");
                let check = check_duplicate(self.store.as_ref(), &prepared.dedup_key)
                    .await
                    .map_err(IngestError::Dedup)?;
                if let Some(existing) = check.existing_document() {
                    return Ok(Err(existing));
                }
            }
        }

        let result = match prepared.reuse.as_ref() {
            Some(previous) => self.store.reset_source(previous, &prepared.new_source).await,
            None => self.store.insert_source(&prepared.new_source).await,
        };

        match result {
            Ok(source) => Ok(Ok(source)),
            Err(e) if is_unique_violation(&e) => {
                self.concurrent_winner(&prepared.dedup_key, e).await.map(Err)
            }
            Err(e) => Err(IngestError::persistence(
                prepared.reuse.as_ref().map(|s| s.id.as_str()),
                &e,
            )),
        }
    }

    /// Describe the source that claimed `key` first, after losing a race
    /// on it with `err`.
    async fn concurrent_winner(
        &self,
        key: &DedupKey,
        err: anyhow::Error,
    ) -> Result<ExistingDocument, IngestError> {
        info!(key = key.as_str(), "dedup key claimed concurrently");
        let check = check_duplicate(self.store.as_ref(), key)
            .await
            .map_err(IngestError::Dedup)?;
        check
            .existing_document()
            .ok_or_else(|| IngestError::persistence(None, &err))
    }

    /// Record a fatal failure on the source. Failures to record are logged.
    async fn mark_failed(&self, source_id: &str, metadata: &mut SourceMetadata, message: String) {
        metadata.fail(message);
        if let Err(e) = self.store.update_source_metadata(source_id, metadata).await {
            warn!(source_id, error = %format!("{:#}", e), "failed to record source failure");
        }
    }

    /// Shared tail: claim → chunk → embed → persist → grant → reconcile.
    pub(crate) async fn process_source(
        &self,
        prepared: PreparedSource,
        coach_access: &[CoachAccess],
    ) -> Result<TailOutcome, IngestError> {
        let source = match self.claim_source(&prepared).await? {
            Ok(source) => source,
            Err(existing) => return Ok(TailOutcome::Conflict(existing)),
        };
        let source_id = source.id.clone();
        let mut metadata = source.metadata.clone();
        info!(source_id = %source_id, title = %source.title, reused = prepared.reuse.is_some(), "content source created");

        let version = match self.store.next_chunk_version(&source_id).await {
            Ok(v) => v,
            Err(e) => {
                let err = IngestError::persistence(Some(&source_id), &e);
                self.mark_failed(&source_id, &mut metadata, err.to_string()).await;
                return Err(err);
            }
        };
        metadata.chunk_version = Some(version);

        let windows = chunk_text(
            &source.content,
            self.options.chunk_size,
            self.options.chunk_overlap,
        );
        let total = windows.len();
        let texts: Vec<String> = windows.iter().map(|w| w.text.clone()).collect();

        let batch = embed_chunks(self.embedder.as_ref(), &texts, self.options.max_concurrency).await;
        for failure in &batch.failures {
            warn!(source_id = %source_id, chunk_index = failure.chunk_index, error = %failure.error, "chunk embedding failed");
        }

        if batch.embedded.is_empty() {
            metadata.reconcile(0, total, batch.failures.clone());
            if let Err(e) = self.store.update_source_metadata(&source_id, &metadata).await {
                warn!(source_id = %source_id, error = %format!("{:#}", e), "failed to record source failure");
            }
            return Err(IngestError::NoChunksEmbedded {
                source_id,
                errors: batch.failures,
            });
        }

        let now = Utc::now();
        let chunks: Vec<Chunk> = batch
            .embedded
            .into_iter()
            .map(|(index, embedding)| {
                let window = &windows[index];
                Chunk {
                    id: Uuid::new_v4().to_string(),
                    source_id: source_id.clone(),
                    title: chunk_title(&source.title, index, total),
                    content: window.text.clone(),
                    chunk_index: index,
                    total_chunks: total,
                    embedding,
                    metadata: ChunkMetadata {
                        char_length: window.char_len(),
                        byte_length: window.text.len(),
                        offset: window.offset,
                    },
                    version,
                    is_active: true,
                    created_at: now,
                }
            })
            .collect();

        if let Err(e) = self.store.insert_chunks(&chunks).await {
            if is_unique_violation(&e) {
                // A concurrent attempt on the same source wrote this version
                // first; its status stays as it recorded it.
                let existing = self.concurrent_winner(&prepared.dedup_key, e).await?;
                return Ok(TailOutcome::Conflict(existing));
            }
            let err = IngestError::persistence(Some(&source_id), &e);
            metadata.chunks_created = Some(0);
            metadata.total_chunks = Some(total);
            metadata.errors = batch.failures;
            self.mark_failed(&source_id, &mut metadata, err.to_string()).await;
            return Err(err);
        }
        info!(source_id = %source_id, chunks = chunks.len(), total, version, "chunks persisted");

        let chunk_ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();
        let access = assign_access(self.store.as_ref(), &chunk_ids, coach_access).await;

        let status = metadata.reconcile(chunks.len(), total, batch.failures);
        // Chunks and grants are already committed.
        match self.store.update_source_metadata(&source_id, &metadata).await {
            Ok(()) => info!(source_id = %source_id, status = %status, "source status reconciled"),
            Err(e) => warn!(
                source_id = %source_id,
                status = %status,
                error = %format!("{:#}", e),
                "failed to record source status"
            ),
        }

        Ok(TailOutcome::Ingested(IngestSummary {
            source_id,
            title: source.title,
            chunks_created: chunks.len(),
            total_chunks: total,
            status,
            version,
            errors: metadata.errors,
            access,
        }))
    }
}

/// CLI entry point for `ragctl upload`.
///
/// Each file is ingested independently; a failing file is reported and the
/// batch continues. Returns an error if any file failed.
pub async fn run_upload(
    config: &Config,
    paths: &[PathBuf],
    coach_access: &[CoachAccess],
    title: Option<String>,
    source_type: SourceType,
    progress: ProgressMode,
) -> anyhow::Result<()> {
    let files = collect_upload_files(paths, &config.upload)?;
    if files.is_empty() {
        println!("No files matched.");
        return Ok(());
    }
    if title.is_some() && files.len() > 1 {
        anyhow::bail!("--title can only be used with a single file ({} matched)", files.len());
    }

    let ingestor = Ingestor::from_config(config).await?;
    let reporter = progress.reporter();
    let total = files.len() as u64;
    let mut failed = 0usize;

    for (i, path) in files.iter().enumerate() {
        let label = path.display().to_string();
        let outcome = match FileUpload::from_path(path) {
            Ok(mut upload) => {
                upload.title = title.clone();
                upload.source_type = source_type;
                ingestor.ingest_file(upload, coach_access).await
            }
            Err(e) => Err(IngestError::validation(format!("cannot read {}: {}", label, e))),
        };

        let word = match outcome {
            Ok(UploadOutcome::Created(summary)) => {
                println!(
                    "{:<10} {}  {}  chunks {}/{}  v{}  {}",
                    summary.status.as_str(),
                    summary.source_id,
                    summary.title,
                    summary.chunks_created,
                    summary.total_chunks,
                    summary.version,
                    label
                );
                for grant in summary.access.iter().filter(|a| !a.success) {
                    println!(
                        "  access for {} failed: {}",
                        grant.coach_id,
                        grant.error.as_deref().unwrap_or("unknown error")
                    );
                }
                summary.status.as_str().to_string()
            }
            Ok(UploadOutcome::Duplicate(existing)) => {
                println!(
                    "{:<10} {}  already uploaded as \"{}\" ({} chunks)  {}",
                    "duplicate", existing.id, existing.title, existing.chunk_count, label
                );
                "duplicate".to_string()
            }
            Err(e) => {
                failed += 1;
                println!("{:<10} {}  {}", "failed", label, e);
                "failed".to_string()
            }
        };

        reporter.report(&ProgressEvent {
            label,
            n: i as u64 + 1,
            total,
            outcome: word,
        });
    }

    if failed > 0 {
        anyhow::bail!("{} of {} file(s) failed", failed, files.len());
    }
    Ok(())
}
