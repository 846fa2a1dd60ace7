//! HTTP server.
//!
//! Exposes both ingestion flows and source administration as a JSON HTTP
//! API. Authentication is expected to sit in front of this server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/rag/upload` | Multipart file upload (`file`, `coachAccess`, `sourceType`, `title`) |
//! | `POST` | `/youtube/process` | Ingest a video or playlist |
//! | `GET`  | `/youtube/process?videoId=` | Pre-flight duplicate status of one video |
//! | `GET`  | `/rag/sources/{id}` | Source record, chunks and grants |
//! | `POST` | `/rag/sources/{id}/deactivate` | Soft-delete all chunks of a source |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "success": false, "error": { "code": "validation_error", "message": "..." } }
//! ```
//!
//! Validation → 400, unknown source → 404, persistence / embedding → 500,
//! upstream video platform → 502. Duplicates answer 409 with an
//! `existingDocument` body instead of an error.

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use coach_rag_core::dedup::ExistingDocument;
use coach_rag_core::models::{CoachAccess, SourceType};

use crate::config::Config;
use crate::error::IngestError;
use crate::get::{deactivate_source, get_source_detail};
use crate::ingest::{FileUpload, Ingestor, UploadOutcome};
use crate::youtube_ingest::{VideoResult, VideoStatus, YoutubeOutcome, YoutubeRequest, YoutubeSummary};

/// Room for multipart boundaries and the non-file fields.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    ingestor: Arc<Ingestor>,
}

/// Starts the HTTP server on `[server].bind` and runs until the process
/// is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let ingestor = Arc::new(Ingestor::from_config(config).await?);
    let app = build_router(ingestor, config.upload.max_file_bytes as usize);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "HTTP server listening");
    println!("Coach RAG server listening on http://{}", config.server.bind);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the router around an existing [`Ingestor`].
pub fn build_router(ingestor: Arc<Ingestor>, max_file_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/rag/upload", post(handle_upload))
        .route("/youtube/process", post(handle_youtube).get(handle_video_status))
        .route("/rag/sources/{id}", get(handle_get_source))
        .route("/rag/sources/{id}/deactivate", post(handle_deactivate))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(max_file_bytes + MULTIPART_OVERHEAD))
        .layer(cors)
        .with_state(AppState { ingestor })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "validation_error".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    error!(error = %format!("{:#}", err), "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: format!("{:#}", err),
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        let status = match &err {
            IngestError::Validation(_) | IngestError::Extraction(_) => StatusCode::BAD_REQUEST,
            IngestError::Upstream(_) => StatusCode::BAD_GATEWAY,
            IngestError::Dedup(_)
            | IngestError::Persistence { .. }
            | IngestError::NoChunksEmbedded { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(code = err.code(), error = %err, "ingestion failed");
        }
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

// ============ Duplicate response ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DuplicateBody {
    success: bool,
    is_duplicate: bool,
    message: String,
    existing_document: ExistingDocument,
}

fn duplicate_response(existing: ExistingDocument, what: &str) -> Response {
    let body = DuplicateBody {
        success: false,
        is_duplicate: true,
        message: format!("This {} has already been uploaded as \"{}\"", what, existing.title),
        existing_document: existing,
    };
    (StatusCode::CONFLICT, Json(body)).into_response()
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /rag/upload ============

fn parse_coach_access(raw: &str) -> Result<Vec<CoachAccess>, AppError> {
    serde_json::from_str(raw).map_err(|e| bad_request(format!("invalid coachAccess JSON: {}", e)))
}

async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut upload: Option<FileUpload> = None;
    let mut coach_access: Vec<CoachAccess> = Vec::new();
    let mut source_type = SourceType::Document;
    let mut title: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().map(str::to_string);
                let mime_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("failed to read file: {}", e)))?;
                upload = Some(FileUpload {
                    file_name,
                    mime_type,
                    bytes: bytes.to_vec(),
                    ..Default::default()
                });
            }
            "coachAccess" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| bad_request(e.to_string()))?;
                coach_access = parse_coach_access(&raw)?;
            }
            "sourceType" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| bad_request(e.to_string()))?;
                source_type = raw.parse().map_err(|e: anyhow::Error| bad_request(e.to_string()))?;
            }
            "title" => {
                title = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| bad_request(e.to_string()))?,
                );
            }
            _ => {}
        }
    }

    let mut upload = upload.ok_or_else(|| bad_request("file is required"))?;
    upload.source_type = source_type;
    upload.title = title;

    match state.ingestor.ingest_file(upload, &coach_access).await? {
        UploadOutcome::Created(summary) => Ok(Json(serde_json::json!({
            "success": true,
            "source": summary,
        }))
        .into_response()),
        UploadOutcome::Duplicate(existing) => Ok(duplicate_response(existing, "document")),
    }
}

// ============ POST /youtube/process ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct YoutubeBody {
    #[serde(flatten)]
    request: YoutubeRequest,
    #[serde(default)]
    coach_access: Vec<CoachAccess>,
}

#[derive(Serialize)]
struct YoutubeResponse {
    success: bool,
    results: Vec<VideoResult>,
    summary: YoutubeSummary,
}

async fn handle_youtube(
    State(state): State<AppState>,
    body: Result<Json<YoutubeBody>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(body) = body.map_err(|e| bad_request(e.body_text()))?;
    match state
        .ingestor
        .process_youtube(&body.request, &body.coach_access)
        .await?
    {
        YoutubeOutcome::Duplicate(existing) => Ok(duplicate_response(existing, "video")),
        YoutubeOutcome::Processed { videos, summary } => Ok(Json(YoutubeResponse {
            success: true,
            results: videos.iter().map(|v| v.to_result()).collect(),
            summary,
        })
        .into_response()),
    }
}

// ============ GET /youtube/process ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusQuery {
    video_id: Option<String>,
    url: Option<String>,
}

#[derive(Serialize)]
struct StatusResponse {
    success: bool,
    #[serde(flatten)]
    status: VideoStatus,
}

async fn handle_video_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<StatusResponse>, AppError> {
    let input = query
        .video_id
        .or(query.url)
        .ok_or_else(|| bad_request("videoId or url query parameter is required"))?;
    let status = state.ingestor.video_status(&input).await?;
    Ok(Json(StatusResponse {
        success: true,
        status,
    }))
}

// ============ /rag/sources/{id} ============

async fn handle_get_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let detail = get_source_detail(state.ingestor.store().as_ref(), &id)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found(format!("source not found: {}", id)))?;
    Ok(Json(serde_json::json!({ "success": true, "source": detail })).into_response())
}

async fn handle_deactivate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let changed = deactivate_source(state.ingestor.store().as_ref(), &id)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found(format!("source not found: {}", id)))?;
    Ok(Json(serde_json::json!({
        "success": true,
        "sourceId": id,
        "deactivated": changed,
    }))
    .into_response())
}
