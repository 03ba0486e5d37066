use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::handlers;
use crate::middleware::timing;
use crate::stats::stream;
use crate::AppState;

/// Builds the read-only HTTP API plus the reconfigure control route.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // ── Harvested views ─────────────────────────────────────
        .route("/api/views", get(stream::get_views))
        .route("/api/views/stream", get(stream::views_stream))
        // ── Receiver control ────────────────────────────────────
        .route("/api/status", get(handlers::service::service_status))
        .route(
            "/api/service/reconfigure",
            post(handlers::service::reconfigure),
        )
        // ── Provide shared state to all routes above ────────────
        .with_state(state)
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(axum_mw::from_fn(timing::timing_middleware))
        .layer(CorsLayer::permissive())
}
