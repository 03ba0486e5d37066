use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

use crate::exporter::HarvestRound;
use crate::handlers::ApiError;
use crate::AppState;

// ─── GET /api/views ──────────────────────────────────────────────
/// Latest harvest round as JSON. Reading never resets a view; only the
/// exporter's timer does.

pub async fn get_views(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HarvestRound>, ApiError> {
    state
        .exporter
        .latest()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("no harvest round collected yet".into()))
}

// ─── GET /api/views/stream ───────────────────────────────────────
/// Server-Sent Events endpoint.
/// Pushes the latest `HarvestRound` as JSON every second, skipping ticks
/// until the first round exists.

pub async fn views_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let interval = tokio::time::interval(Duration::from_secs(1));

    let stream = IntervalStream::new(interval).filter_map(move |_| {
        let round = state.exporter.latest()?;
        let json = serde_json::to_string(&round).unwrap_or_default();
        Some(Ok(Event::default().id(round.round.to_string()).data(json)))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
