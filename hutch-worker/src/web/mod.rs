//! Thin HTTP host pipeline running next to the consumer.
//!
//! Only a health endpoint is exposed; it reports the subscription state.

pub mod handlers;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

pub use handlers::{health, AppState, HealthResponse};

/// Build the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
