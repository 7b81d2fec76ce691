//! Host HTTP pipeline endpoints.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use tokio::sync::watch;

use crate::consumer::ConsumerStatus;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub consumer_status: watch::Receiver<ConsumerStatus>,
}

impl AppState {
    pub fn new(consumer_status: watch::Receiver<ConsumerStatus>) -> Self {
        Self { consumer_status }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub consumer: ConsumerStatus,
}

/// Health check endpoint.
///
/// The process is healthy while the subscription is consuming; any other
/// consumer state answers 503 so orchestrators can hold traffic back.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let consumer = *state.consumer_status.borrow();
    let (code, status) = match consumer {
        ConsumerStatus::Consuming => (StatusCode::OK, "ok"),
        _ => (StatusCode::SERVICE_UNAVAILABLE, "degraded"),
    };

    (code, Json(HealthResponse { status, consumer }))
}
