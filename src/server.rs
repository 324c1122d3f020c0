//! HTTP surface: upload, lookup and export endpoints over [`StoryService`].
//!
//! # Routes
//!
//! - `POST /api/storygenerator/upload` - multipart `file` (+ `language`,
//!   `mood`, `keywords`) → [`StoryResponse`]
//! - `GET /api/storygenerator/:id` - cached story → [`StoryResponse`]
//! - `GET /api/storygenerator/:id/export/json` - JSON download
//! - `GET /api/storygenerator/:id/export/pdf` - PDF download
//! - `GET /helloworld` - liveness
//!
//! Every failure is answered with an [`ErrorResponse`] body.

use crate::config::StoryConfig;
use crate::error::{AiErrorKind, PdfErrorKind, StorageErrorKind, StoryError};
use crate::pipeline::extract::{validate_upload, UploadMeta};
use crate::service::StoryService;
use crate::story::StoryResponse;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Room for multipart boundaries and the small form fields.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// JSON body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error_code: String,
    pub message: String,
    pub user_friendly_message: String,
    pub timestamp: DateTime<Utc>,
}

/// An error on its way to becoming an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    fn new(
        status: StatusCode,
        code: impl Into<String>,
        message: impl Into<String>,
        user_message: impl Into<String>,
    ) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error_code: code.into(),
                message: message.into(),
                user_friendly_message: user_message.into(),
                timestamp: Utc::now(),
            },
        }
    }

    fn invalid_id() -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "INVALID_ID",
            "Story ID cannot be empty",
            "Please provide a valid story ID",
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

/// HTTP status for a library error.
pub fn status_for(err: &StoryError) -> StatusCode {
    match err {
        StoryError::PdfProcessing { .. } | StoryError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        StoryError::Ai {
            kind: AiErrorKind::RateLimitExceeded,
            ..
        } => StatusCode::TOO_MANY_REQUESTS,
        StoryError::Ai { .. } => StatusCode::SERVICE_UNAVAILABLE,
        StoryError::StoryNotFound { .. } => StatusCode::NOT_FOUND,
        StoryError::Storage {
            kind: StorageErrorKind::FileNotFound,
            ..
        } => StatusCode::NOT_FOUND,
        StoryError::Storage { .. }
        | StoryError::InvalidConfig(_)
        | StoryError::PdfiumBindingFailed(_)
        | StoryError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<StoryError> for ApiError {
    fn from(err: StoryError) -> Self {
        let status = status_for(&err);
        // Internal details stay in the log.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR
            && !matches!(err, StoryError::Storage { .. })
        {
            "An unexpected error occurred while processing the request".to_string()
        } else {
            err.to_string()
        };
        Self::new(status, err.code(), message, err.user_message())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn attachment(content_type: &'static str, file_name: String, body: Vec<u8>) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        body,
    )
        .into_response()
}

// ── Router ───────────────────────────────────────────────────────────────

/// Build the application router around a shared service.
pub fn router(service: Arc<StoryService>) -> Router {
    let body_limit = service.max_upload_bytes() + MULTIPART_OVERHEAD;
    Router::new()
        .route("/api/storygenerator/upload", post(upload))
        .route("/api/storygenerator/:id", get(get_story))
        .route("/api/storygenerator/:id/export/json", get(export_json))
        .route("/api/storygenerator/:id/export/pdf", get(export_pdf))
        .route("/helloworld", get(hello_world))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Periodically drop expired stories from the cache.
pub fn spawn_cache_purger(service: Arc<StoryService>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = service.purge_expired().await;
            if removed > 0 {
                info!("Purged {} expired stories", removed);
            }
        }
    })
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(service: Arc<StoryService>, addr: SocketAddr) -> Result<(), StoryError> {
    let purge_every = (service.cache().ttl() / 4).clamp(Duration::from_secs(1), Duration::from_secs(600));
    let purger = spawn_cache_purger(Arc::clone(&service), purge_every);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| StoryError::InvalidConfig(format!("Cannot bind {addr}: {e}")))?;
    info!("Listening on http://{}", addr);

    let result = axum::serve(listener, router(service))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .map_err(|e| StoryError::Internal(format!("Server error: {e}")));
    purger.abort();
    result
}

// ── Handlers ─────────────────────────────────────────────────────────────

async fn hello_world() -> &'static str {
    "Hello from the Dragonscale Storyteller!"
}

struct UploadForm {
    file_name: String,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return StoryError::pdf(PdfErrorKind::FileSizeExceeded, e.body_text()).into();
    }
    ApiError::new(
        StatusCode::BAD_REQUEST,
        "INVALID_FILE",
        format!("Failed to read multipart body: {}", e.body_text()),
        "The file must be a valid PDF and not exceed 10MB in size",
    )
}

async fn upload(
    State(service): State<Arc<StoryService>>,
    mut multipart: Multipart,
) -> Result<Json<StoryResponse>, ApiError> {
    let mut form: Option<UploadForm> = None;
    let (mut language, mut mood, mut keywords) = (None, None, None);

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(multipart_error)?;
                form = Some(UploadForm {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            "language" => language = Some(field.text().await.map_err(multipart_error)?),
            "mood" => mood = Some(field.text().await.map_err(multipart_error)?),
            "keywords" => keywords = Some(field.text().await.map_err(multipart_error)?),
            other => warn!("Ignoring unknown form field '{}'", other),
        }
    }

    info!(
        "Received PDF upload request: {}",
        form.as_ref().map(|f| f.file_name.as_str()).unwrap_or("null")
    );

    let form = match form {
        Some(f) if !f.bytes.is_empty() => f,
        _ => {
            warn!("Upload failed: No file provided");
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "NO_FILE",
                "No file was provided in the request",
                "Please select a PDF file to upload",
            ));
        }
    };

    let meta = UploadMeta {
        file_name: &form.file_name,
        content_type: form.content_type.as_deref(),
        size: form.bytes.len(),
    };
    if let Err(e) = validate_upload(&meta, service.max_upload_bytes()) {
        warn!("Upload failed: Invalid PDF file - {}: {}", form.file_name, e);
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "INVALID_FILE",
            format!("File validation failed for {}", form.file_name),
            "The file must be a valid PDF and not exceed 10MB in size",
        ));
    }

    let config = StoryConfig::from_form(language.as_deref(), mood.as_deref(), keywords.as_deref())?;
    info!(
        "Story configuration: language={}, mood={}, keywords={}",
        config.language,
        config.mood,
        config.keywords.join(", ")
    );

    let story = service
        .create_story_from_pdf(&form.bytes, &form.file_name, Some(config))
        .await
        .map_err(|e| {
            error!("Story generation failed for {}: {}", form.file_name, e);
            ApiError::from(e)
        })?;

    info!("Story generated successfully: {} from {}", story.id, form.file_name);
    Ok(Json(StoryResponse::ok(story)))
}

async fn get_story(
    State(service): State<Arc<StoryService>>,
    Path(id): Path<String>,
) -> Result<Json<StoryResponse>, ApiError> {
    if id.trim().is_empty() {
        return Err(ApiError::invalid_id());
    }
    match service.get_story(&id).await? {
        Some(story) => {
            info!("Story retrieved successfully: {}", id);
            Ok(Json(StoryResponse::ok(story)))
        }
        None => {
            warn!("Story not found: {}", id);
            Err(StoryError::StoryNotFound { id }.into())
        }
    }
}

async fn export_json(
    State(service): State<Arc<StoryService>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    if id.trim().is_empty() {
        return Err(ApiError::invalid_id());
    }
    let json = service.export_story_json(&id).await?;
    Ok(attachment(
        "application/json",
        format!("story-{id}.json"),
        json.into_bytes(),
    ))
}

async fn export_pdf(
    State(service): State<Arc<StoryService>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    if id.trim().is_empty() {
        return Err(ApiError::invalid_id());
    }
    let bytes = service.export_story_pdf(&id).await.map_err(|e| {
        let mut api = ApiError::from(e);
        if api.body.error_code.starts_with("STORAGE_") {
            api.body.user_friendly_message =
                "Failed to retrieve the PDF file. Please try regenerating the story.".into();
        }
        api
    })?;
    Ok(attachment("application/pdf", format!("story-{id}.pdf"), bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            status_for(&StoryError::pdf(PdfErrorKind::NoTextContent, "x")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&StoryError::ai(AiErrorKind::RateLimitExceeded, "c", "m")),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_for(&StoryError::ai(AiErrorKind::InvalidResponse, "c", "m")),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&StoryError::storage(StorageErrorKind::FileNotFound, "p", "m")),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&StoryError::storage(StorageErrorKind::SaveFailed, "p", "m")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(&StoryError::StoryNotFound { id: "x".into() }),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn internal_details_are_not_leaked() {
        let api = ApiError::from(StoryError::Internal("secret stack".into()));
        assert_eq!(api.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.body.error_code, "INTERNAL_ERROR");
        assert!(!api.body.message.contains("secret"));
    }

    #[test]
    fn error_body_is_camel_case() {
        let api = ApiError::invalid_id();
        let json = serde_json::to_value(&api.body).unwrap();
        assert_eq!(json["errorCode"], "INVALID_ID");
        assert!(json.get("userFriendlyMessage").is_some());
        assert!(json.get("timestamp").is_some());
    }
}
