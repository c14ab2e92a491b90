//! HTTP request handlers

use super::types::{ChatRequest, ChatResponse, ErrorResponse, HealthResponse, WebhookForm};
use super::AppState;
use crate::db::Message;
use crate::llm::LlmErrorKind;
use crate::relay::{InboundMessage, RelayError};
use async_trait::async_trait;
use axum::{
    extract::{rejection::QueryRejection, FromRequest, Path, Query, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;

const DEFAULT_HISTORY_LIMIT: usize = 50;
const MAX_HISTORY_LIMIT: usize = 500;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/chat", post(chat))
        .route("/history/:recipient", get(history))
        .with_state(state)
}

// ============================================================
// Health
// ============================================================

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        message: state.service_name.to_string(),
    })
}

// ============================================================
// Webhook
// ============================================================

/// Inbound message decoded from either a JSON body or a provider form post
struct InboundPayload(InboundMessage);

#[async_trait]
impl<S> FromRequest<S> for InboundPayload
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let inbound = if content_type.starts_with("application/json") {
            let Json(body) = Json::<ChatRequest>::from_request(req, state)
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            InboundMessage::new(body.recipient, body.message, body.sender)
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(form) = Form::<WebhookForm>::from_request(req, state)
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            InboundMessage::new(form.from, form.body, form.to)
        } else {
            return Err(AppError::BadRequest(format!(
                "Unsupported content type {content_type:?}; expected JSON or form data"
            )));
        };

        inbound.map(InboundPayload).map_err(AppError::from)
    }
}

async fn chat(
    State(state): State<AppState>,
    InboundPayload(inbound): InboundPayload,
) -> Result<Json<ChatResponse>, AppError> {
    let reply = state.relay.handle(inbound).await?;
    Ok(Json(reply.into()))
}

// ============================================================
// History
// ============================================================

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

async fn history(
    State(state): State<AppState>,
    Path(recipient): Path<String>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<Vec<Message>>, AppError> {
    let Query(query) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .min(MAX_HISTORY_LIMIT);
    if limit == 0 {
        return Ok(Json(Vec::new()));
    }

    let messages = state.relay.history(&recipient, limit).await?;
    Ok(Json(messages))
}

// ============================================================
// Error Handling
// ============================================================

enum AppError {
    BadRequest(String),
    BadGateway { kind: &'static str, message: String },
    GatewayTimeout { kind: &'static str, message: String },
    Internal(String),
}

impl From<RelayError> for AppError {
    fn from(err: RelayError) -> Self {
        let kind = err.kind();
        let message = err.to_string();
        match err {
            RelayError::Validation(msg) => AppError::BadRequest(msg),
            RelayError::Generation(e) if e.kind == LlmErrorKind::Timeout => {
                AppError::GatewayTimeout { kind, message }
            }
            RelayError::Generation(_) | RelayError::Delivery(_) => {
                AppError::BadGateway { kind, message }
            }
            RelayError::Storage(_) => {
                tracing::error!(error = %message, "Storage failure");
                AppError::Internal(message)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, ErrorResponse::new("validation", msg))
            }
            AppError::BadGateway { kind, message } => {
                (StatusCode::BAD_GATEWAY, ErrorResponse::new(kind, message))
            }
            AppError::GatewayTimeout { kind, message } => {
                (StatusCode::GATEWAY_TIMEOUT, ErrorResponse::new(kind, message))
            }
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new("storage", msg),
            ),
        };

        (status, Json(body)).into_response()
    }
}
