use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use intake_core::statistics::RequestStatistics;
use intake_core::{IngestOutcome, IngestPipeline, IntakeError};
use serde_json::json;
use tracing::error;

pub const UPLOAD_FIELD: &str = "request_csv";

const INDEX_HTML: &str = include_str!("../assets/index.html");

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<IngestPipeline>,
}

impl AppState {
    pub fn new(pipeline: Arc<IngestPipeline>) -> Self {
        Self { pipeline }
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route("/api/v1/action", post(upload))
        .route("/api/v1/statistics", get(statistics))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<IngestOutcome>, ApiError> {
    let mut contents = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::bad_request(err.to_string()))?
    {
        if field.name() == Some(UPLOAD_FIELD) {
            let bytes = field
                .bytes()
                .await
                .map_err(|err| ApiError::bad_request(err.to_string()))?;
            contents = Some(bytes);
            break;
        }
    }

    let contents = contents.ok_or_else(|| {
        ApiError::bad_request(format!("multipart field '{UPLOAD_FIELD}' is required"))
    })?;

    let outcome = state.pipeline.ingest(&contents).await?;
    Ok(Json(outcome))
}

async fn statistics(State(state): State<AppState>) -> Result<Json<RequestStatistics>, ApiError> {
    let statistics = state.pipeline.current_statistics().await?;
    Ok(Json(statistics))
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<IntakeError> for ApiError {
    fn from(err: IntakeError) -> Self {
        let status = match &err {
            IntakeError::Decode(_) | IntakeError::Validation(_) => StatusCode::BAD_REQUEST,
            IntakeError::StoreReplace(intake_core::error::StoreError::Constraint(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            IntakeError::StoreReplace(_) | IntakeError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            error!("upload failed: {err}");
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
