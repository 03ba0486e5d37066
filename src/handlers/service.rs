use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::receiver::{Endpoint, ReceiverStatsSnapshot};
use crate::service::{Reconfigured, Service, ServiceState};
use crate::AppState;

use super::ApiError;

// ─── Request / response types ────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ReconfigureRequest {
    pub address: String,
    pub port: u16,
}

#[derive(Debug, Serialize)]
pub struct ServiceStatus {
    pub state: ServiceState,
    pub endpoint: Endpoint,
    pub local_addr: Option<SocketAddr>,
    pub views: Vec<String>,
    pub receiver: ReceiverStatsSnapshot,
}

impl ServiceStatus {
    fn of(service: &Service) -> Self {
        Self {
            state: service.state(),
            endpoint: service.endpoint().clone(),
            local_addr: service.local_addr(),
            views: service.registry().view_names(),
            receiver: service.stats(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReconfigureResponse {
    pub outcome: Reconfigured,
    pub status: ServiceStatus,
}

// ─── GET /api/status ─────────────────────────────────────────────

pub async fn service_status(State(state): State<Arc<AppState>>) -> Json<ServiceStatus> {
    let service = state.service.lock().await;
    Json(ServiceStatus::of(&service))
}

// ─── POST /api/service/reconfigure ───────────────────────────────

pub async fn reconfigure(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ReconfigureRequest>,
) -> Result<Json<ReconfigureResponse>, ApiError> {
    if req.port == 0 {
        return Err(ApiError::BadRequest("port must be between 1 and 65535".into()));
    }

    let mut service = state.service.lock().await;
    let outcome = service
        .reconfigure(Endpoint::new(req.address, req.port))
        .await?;

    Ok(Json(ReconfigureResponse {
        outcome,
        status: ServiceStatus::of(&service),
    }))
}
