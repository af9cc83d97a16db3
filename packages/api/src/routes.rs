//! HTTP routes.

use std::convert::Infallible;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::Stream;
use serde::Deserialize;

use crate::gateway::{Gateway, GatewayError};
use crate::realtime::sse_stream;

/// Shared state for the router.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Gateway,
}

/// Body of a submission.
#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub query: String,
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ask", post(ask))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let submission = state.gateway.submit(request.query).await?;
    tracing::debug!("Streaming job {}", submission.job_id);
    Ok(Sse::new(sse_stream(submission.records)).keep_alive(KeepAlive::default()))
}

/// Error response for a refused submission.
#[derive(Debug)]
pub struct ApiError(GatewayError);

impl From<GatewayError> for ApiError {
    fn from(error: GatewayError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            GatewayError::EmptyPrompt => (StatusCode::BAD_REQUEST, "invalid_query"),
            GatewayError::Relay(_) | GatewayError::Queue(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
            }
        };
        (
            status,
            Json(serde_json::json!({
                "error": code,
                "message": self.0.to_string(),
            })),
        )
            .into_response()
    }
}
