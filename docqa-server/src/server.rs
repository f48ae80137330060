use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use docqa_rag::{Document, ErrorKind, IndexReport, QueryRequest, QueryResponse, RagError, RagService};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::AnswerFormat;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RagService>,
    pub answer_format: AnswerFormat,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("collection", &self.service.collection())
            .field("answer_format", &self.answer_format)
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(service: Arc<RagService>) -> Self {
        Self { service, answer_format: AnswerFormat::Plain }
    }

    pub fn with_answer_format(mut self, format: AnswerFormat) -> Self {
        self.answer_format = format;
        self
    }
}

#[derive(Debug, Deserialize)]
pub struct IndexRequest {
    pub documents: Vec<Document>,
}

/// Body of every failed request.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ErrorPayload {
    pub error_kind: ErrorKind,
    pub message: String,
    /// True when the same request may succeed later without changes.
    pub retryable: bool,
}

/// A pipeline error on its way out of a handler.
#[derive(Debug)]
pub struct ApiError(pub RagError);

impl From<RagError> for ApiError {
    fn from(error: RagError) -> Self {
        Self(error)
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidRequest | ErrorKind::InvalidConfig => StatusCode::BAD_REQUEST,
        ErrorKind::ContextTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        ErrorKind::EmbeddingQuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::IndexNotReady
        | ErrorKind::EmbeddingServiceError
        | ErrorKind::StoreUnavailable
        | ErrorKind::GenerationServiceError => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::DimensionMismatch => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(RagError::InvalidRequest(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = status_for(kind);
        warn!(error_kind = ?kind, status = status.as_u16(), error = %self.0, "request failed");
        let payload = ErrorPayload {
            error_kind: kind,
            message: self.0.to_string(),
            retryable: kind.is_retryable(),
        };
        (status, Json(payload)).into_response()
    }
}

pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/query", post(query))
        .route("/index", post(index))
        .route("/documents/{id}", delete(delete_document))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub async fn run_server(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = app_router(state);
    let listener =
        tokio::net::TcpListener::bind(addr).await.with_context(|| format!("failed to bind {addr}"))?;
    info!("docqa listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn root() -> impl IntoResponse {
    Json(json!({"message": "docqa is running"}))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.service.health())
}

async fn query(
    State(state): State<AppState>,
    request: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, ApiError> {
    let Json(request) = request?;
    let mut response = state.service.query(request).await?;
    response.answer = state.answer_format.render(response.answer);
    Ok(Json(response))
}

async fn index(
    State(state): State<AppState>,
    request: Result<Json<IndexRequest>, JsonRejection>,
) -> Result<Json<IndexReport>, ApiError> {
    let Json(request) = request?;
    if request.documents.iter().any(|d| d.id.trim().is_empty()) {
        return Err(RagError::InvalidRequest("every document needs a non-empty id".into()).into());
    }
    Ok(Json(state.service.index(&request.documents).await))
}

async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.service.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
