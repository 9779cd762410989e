//! Route handlers and wire types

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Deserializer};
use serde_json::json;
use tracing::warn;

use super::AppState;
use crate::metrics;
use crate::orchestrator::{ChatSubmission, OrchestratorError};
use crate::sampling::Provider;

/// Body of `POST /setup_state`
#[derive(Debug, Deserialize)]
pub struct SetupRequest {
    #[serde(default, alias = "credential")]
    pub api_key: String,
    #[serde(default)]
    pub provider: Provider,
}

/// Body of `POST /chat`
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, alias = "system_prompt_suffix")]
    pub custom_system_prompt: Option<String>,
    /// Absent keeps the session default; `null` disables image filtering
    #[serde(
        default,
        alias = "image_retention_count",
        deserialize_with = "present_or_null"
    )]
    pub only_n_most_recent_images: Option<Option<usize>>,
}

/// Distinguish an explicit `null` from a missing field
fn present_or_null<'de, D>(deserializer: D) -> Result<Option<Option<usize>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<usize>::deserialize(deserializer).map(Some)
}

impl From<ChatRequest> for ChatSubmission {
    fn from(req: ChatRequest) -> Self {
        ChatSubmission {
            message: req.message,
            model: req.model,
            custom_system_prompt: req.custom_system_prompt,
            only_n_most_recent_images: req.only_n_most_recent_images,
        }
    }
}

/// Error response carrying a FastAPI-style `{"detail": ...}` body
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn internal(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: detail.into(),
        }
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        let status = match &err {
            OrchestratorError::Validation(_) => StatusCode::BAD_REQUEST,
            OrchestratorError::Conflict(_) => StatusCode::CONFLICT,
            OrchestratorError::Restart(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            detail: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

pub async fn setup_state(
    State(state): State<AppState>,
    Json(req): Json<SetupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.orchestrator.setup(req.provider, req.api_key)?;
    Ok(Json(json!({ "detail": "State setup complete" })))
}

pub async fn reset(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    state.orchestrator.reset().await?;
    Ok(Json(json!({ "detail": "State reset complete" })))
}

pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let receipt = state.orchestrator.submit_chat(req.into())?;
    Ok(Json(json!({
        "detail": "Message received",
        "messages": receipt.messages,
    })))
}

pub async fn get_state(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.orchestrator.snapshot())
}

pub async fn api_responses(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.orchestrator.ledger())
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "ok": true,
        "busy": state.orchestrator.is_busy(),
    }))
}

pub async fn metrics() -> Result<impl IntoResponse, ApiError> {
    let body = metrics::gather_text().map_err(|e| {
        warn!(error = %e, "Failed to encode metrics");
        ApiError::internal(format!("failed to encode metrics: {}", e))
    })?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}
