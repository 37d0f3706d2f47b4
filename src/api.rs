use crate::compression;
use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::metadata_store::{MetadataStorage, NewFileRecord};
use crate::object_store::{ObjectStorage, UploadKind};
use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Application state shared across handlers. Both clients are constructed
/// once at startup and live for the process lifetime.
#[derive(Clone)]
pub struct AppState {
    pub object_store: Arc<dyn ObjectStorage>,
    pub metadata_store: Arc<dyn MetadataStorage>,
}

/// Successful upload response
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub file_url: String,
    pub original_size: u64,
    pub final_size: u64,
    pub compressed: bool,
}

/// Query parameters for DELETE /files
#[derive(Debug, Deserialize)]
pub struct DeleteFilesQuery {
    pub user_email: Option<String>,
    /// Record ID; when absent, all of the user's files are deleted
    pub file_id: Option<String>,
}

/// Response for a targeted single-file deletion
#[derive(Debug, Serialize)]
pub struct SingleDeleteResponse {
    pub message: String,
    pub file_id: Uuid,
}

/// Response for a bulk deletion of all files owned by a user
#[derive(Debug, Serialize)]
pub struct BulkDeleteResponse {
    pub message: String,
    pub deleted: u64,
    /// Records whose remote object could not be removed; their metadata
    /// rows are kept so the deletion can be retried
    pub failed: u64,
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/upload", post(upload_file))
        .route("/files", delete(delete_files));

    // Bundled single-page frontend: unmatched paths fall back to the static
    // build, with index.html covering client-side routes
    if let Some(ref dir) = config.static_dir {
        let index = std::path::Path::new(dir).join("index.html");
        router = router.fallback_service(ServeDir::new(dir).not_found_service(ServeFile::new(index)));
    }

    router
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Liveness endpoint
async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "Server is running",
        "status": 200
    }))
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "upload-service"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    // Check database connectivity
    match state.metadata_store.ready().await {
        Ok(_) => (
            axum::http::StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "database": "disconnected",
                "error": e.to_string()
            })),
        ),
    }
}

/// Collected multipart form fields for an upload request
#[derive(Debug, Default)]
struct UploadForm {
    file_bytes: Option<Bytes>,
    media_type: Option<String>,
    name: Option<String>,
    category: Option<String>,
    description: Option<String>,
    tags: Option<String>,
    reported_size: Option<i64>,
    user_email: Option<String>,
}

/// Handle a multipart file upload: classify, optionally compress, push to
/// the object store, then record metadata.
#[instrument(skip(state, multipart))]
async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("Malformed multipart body: {e}")))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "file" => {
                form.media_type = field.content_type().map(str::to_string);
                form.file_bytes = Some(field.bytes().await.map_err(|e| {
                    ApiError::Validation(format!("Failed to read file part: {e}"))
                })?);
            }
            "name" => form.name = Some(field_text(field).await?),
            "type" => form.category = Some(field_text(field).await?),
            "description" => form.description = Some(field_text(field).await?),
            "tags" => form.tags = Some(field_text(field).await?),
            "size" => {
                let raw = field_text(field).await?;
                form.reported_size = Some(raw.parse::<i64>().map_err(|_| {
                    ApiError::Validation(format!("size must be an integer, got {raw:?}"))
                })?);
            }
            "user_email" => form.user_email = Some(field_text(field).await?),
            // Unknown fields are ignored
            _ => {}
        }
    }

    let file_bytes = form.file_bytes.ok_or_else(|| missing("file"))?;
    let name = form.name.ok_or_else(|| missing("name"))?;
    let category = form.category.ok_or_else(|| missing("type"))?;
    let user_email = form.user_email.ok_or_else(|| missing("user_email"))?;

    // The measured length is the source of truth; the client-reported size
    // is stored as an annotation only
    let original_size = file_bytes.len();

    let media_type = form
        .media_type
        .ok_or_else(|| ApiError::UnsupportedType("none declared".to_string()))?;
    let kind = UploadKind::from_media_type(&media_type)
        .ok_or_else(|| ApiError::UnsupportedType(media_type.clone()))?;

    let (payload, upload_media_type, quality_transform) = match kind {
        UploadKind::Image if compression::should_compress_image(original_size) => {
            // Recompressed payload is always JPEG regardless of input format
            let recompressed = compression::compress_image(&file_bytes)?;
            (recompressed, "image/jpeg".to_string(), false)
        }
        UploadKind::Image => (file_bytes.to_vec(), media_type.clone(), false),
        UploadKind::Document => {
            // Document bytes are never reinterpreted locally; oversized ones
            // get the store's own best-effort transformation
            let transform = compression::should_compress_document(original_size);
            (file_bytes.to_vec(), media_type.clone(), transform)
        }
    };

    let final_size = payload.len();

    let stored = state
        .object_store
        .upload(payload, &user_email, kind, &upload_media_type, quality_transform)
        .await?;

    // Remote write strictly precedes the metadata insert; a failed insert
    // leaves the remote object in place with no compensating cleanup
    let record = NewFileRecord {
        name,
        category,
        description: form.description,
        tags: form.tags.as_deref().map(parse_tags).unwrap_or_default(),
        original_size: original_size as i64,
        reported_size: form.reported_size,
        final_size: final_size as i64,
        owner_email: user_email.clone(),
        remote_url: stored.url.clone(),
        remote_key: stored.key,
    };

    let file_id = state.metadata_store.insert_file(&record).await?;

    info!(
        file_id = %file_id,
        owner = %user_email,
        original_size = original_size,
        final_size = final_size,
        "File uploaded"
    );
    metrics::counter!("upload.files.uploaded").increment(1);

    Ok(Json(UploadResponse {
        message: "File uploaded successfully".to_string(),
        file_url: stored.url,
        original_size: original_size as u64,
        final_size: final_size as u64,
        compressed: original_size != final_size,
    }))
}

/// Delete one file by ID, or all of a user's files when no ID is given
#[instrument(skip(state))]
async fn delete_files(
    State(state): State<AppState>,
    Query(params): Query<DeleteFilesQuery>,
) -> Result<Response, ApiError> {
    let user_email = params
        .user_email
        .filter(|e| !e.is_empty())
        .ok_or_else(|| ApiError::Validation("Missing required query parameter: user_email".to_string()))?;

    // Targeted single-file deletion
    if let Some(ref raw_id) = params.file_id {
        let file_id = Uuid::parse_str(raw_id)
            .map_err(|_| ApiError::Validation(format!("Invalid file_id: {raw_id}")))?;

        // Scoping by owner means a mismatched owner is indistinguishable
        // from an absent record
        let record = state
            .metadata_store
            .get_file_for_owner(file_id, &user_email)
            .await?
            .ok_or_else(|| ApiError::NotFound("File not found or access denied".to_string()))?;

        state.object_store.delete(&record.remote_key).await?;
        state.metadata_store.delete_file(record.id).await?;

        info!(file_id = %file_id, owner = %user_email, "File deleted");
        metrics::counter!("upload.files.deleted").increment(1);

        return Ok(Json(SingleDeleteResponse {
            message: "File deleted successfully".to_string(),
            file_id: record.id,
        })
        .into_response());
    }

    // Bulk deletion of everything the user owns
    let records = state.metadata_store.list_files_for_owner(&user_email).await?;

    if records.is_empty() {
        return Ok(Json(BulkDeleteResponse {
            message: "No files found for user".to_string(),
            deleted: 0,
            failed: 0,
        })
        .into_response());
    }

    let mut removed_ids = Vec::with_capacity(records.len());
    let mut failed = 0u64;

    for record in &records {
        match state.object_store.delete(&record.remote_key).await {
            Ok(()) => removed_ids.push(record.id),
            Err(e) => {
                // Keep the metadata row so the deletion can be retried
                warn!(error = %e, file_id = %record.id, "Remote deletion failed");
                failed += 1;
            }
        }
    }

    let deleted = state.metadata_store.delete_files_by_ids(&removed_ids).await?;

    info!(owner = %user_email, deleted = deleted, failed = failed, "Bulk deletion finished");
    metrics::counter!("upload.files.deleted").increment(deleted);

    let message = if failed == 0 {
        "All user files deleted successfully".to_string()
    } else {
        format!("Deleted {deleted} files; {failed} remote deletions failed and were kept for retry")
    };

    Ok(Json(BulkDeleteResponse {
        message,
        deleted,
        failed,
    })
    .into_response())
}

/// Read a text form field
async fn field_text(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::Validation(format!("Failed to read form field: {e}")))
}

fn missing(field: &str) -> ApiError {
    ApiError::Validation(format!("Missing required field: {field}"))
}

/// Split a comma-delimited tag list. Segments are kept verbatim; only a
/// fully absent or empty input yields no tags.
fn parse_tags(raw: &str) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split(',').map(str::to_string).collect()
}

/// Start the HTTP API server
pub async fn start_api_server(state: AppState, config: &ApiConfig) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting upload API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .await
        .context("API server error")?;

    Ok(())
}
