//! Route handler functions for all API endpoints.
//!
//! Each handler extracts parameters via axum extractors, calls into the
//! coordinator or query engine, and returns JSON. The visibility scope for
//! search arrives as an explicit `rooms` parameter supplied by the
//! authorization layer in front of this service.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use palaver_core::config::SearchConfig;
use palaver_core::types::{ContentItem, ContentType};
use palaver_search::SearchResponse;

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Request/response types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateTextRequest {
    pub author_id: Uuid,
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateVoiceRequest {
    pub author_id: Uuid,
    /// Opaque reference to the stored audio payload.
    pub file_ref: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateAttachmentRequest {
    pub author_id: Uuid,
    /// One of "image", "video", "document".
    pub content_type: String,
    pub file_name: Option<String>,
    /// Opaque reference to the stored payload.
    pub file_ref: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    /// Comma-separated room ids forming the requester's visibility scope.
    pub rooms: Option<String>,
    /// Optional single-room filter within the scope.
    pub room_id: Option<Uuid>,
    pub keyword_limit: Option<usize>,
    pub semantic_limit: Option<usize>,
    pub sentence_limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub message_vectors: usize,
    pub sentence_vectors: usize,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub status: String,
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /health - liveness plus index counters.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        message_vectors: state.index.message_count(),
        sentence_vectors: state.index.sentence_count(),
    })
}

/// POST /rooms/{room_id}/content - create a plain text item.
pub async fn create_text(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Json(req): Json<CreateTextRequest>,
) -> Result<Json<ContentItem>, ApiError> {
    if req.body.trim().is_empty() {
        return Err(ApiError::BadRequest("Content body is empty".to_string()));
    }

    let item = state
        .coordinator
        .create_text(room_id, req.author_id, req.body)
        .await?;
    Ok(Json(item))
}

/// POST /rooms/{room_id}/voice - create a voice item; transcription runs in
/// the background and is announced via the room channel.
pub async fn create_voice(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Json(req): Json<CreateVoiceRequest>,
) -> Result<Json<ContentItem>, ApiError> {
    if req.file_ref.trim().is_empty() {
        return Err(ApiError::BadRequest("Missing file reference".to_string()));
    }

    let item = state
        .coordinator
        .create_voice(room_id, req.author_id, req.file_ref)
        .await?;
    Ok(Json(item))
}

/// POST /rooms/{room_id}/attachment - create an image, video, or document
/// item. Documents get background text extraction.
pub async fn create_attachment(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Json(req): Json<CreateAttachmentRequest>,
) -> Result<Json<ContentItem>, ApiError> {
    let content_type: ContentType = req
        .content_type
        .parse()
        .map_err(|e: String| ApiError::BadRequest(e))?;
    if !matches!(
        content_type,
        ContentType::Image | ContentType::Video | ContentType::Document
    ) {
        return Err(ApiError::BadRequest("Invalid attachment type".to_string()));
    }
    if req.file_ref.trim().is_empty() {
        return Err(ApiError::BadRequest("Missing file reference".to_string()));
    }

    let item = state
        .coordinator
        .create_attachment(room_id, req.author_id, content_type, req.file_name, req.file_ref)
        .await?;
    Ok(Json(item))
}

/// DELETE /rooms/{room_id}/content/{content_id} - soft-delete an item.
pub async fn delete_content(
    State(state): State<AppState>,
    Path((_room_id, content_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<DeleteResponse>, ApiError> {
    state.coordinator.delete_content(content_id).await?;
    Ok(Json(DeleteResponse {
        status: "ok".to_string(),
    }))
}

/// GET /search - hybrid keyword + semantic search over the caller's scope.
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let query = params.q.unwrap_or_default();
    let scope = parse_scope(params.rooms.as_deref().unwrap_or(""))?;

    let defaults = &state.config.search;
    let limits = SearchConfig {
        keyword_limit: params.keyword_limit.unwrap_or(defaults.keyword_limit),
        semantic_limit: params.semantic_limit.unwrap_or(defaults.semantic_limit),
        sentence_limit: params.sentence_limit.unwrap_or(defaults.sentence_limit),
    };

    let response = state
        .engine
        .search(&query, &scope, params.room_id, &limits)
        .await?;
    Ok(Json(response))
}

/// Parse a comma-separated list of room ids into a visibility scope.
pub(crate) fn parse_scope(raw: &str) -> Result<Vec<Uuid>, ApiError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            Uuid::parse_str(part)
                .map_err(|_| ApiError::BadRequest(format!("Invalid room id: {}", part)))
        })
        .collect()
}
