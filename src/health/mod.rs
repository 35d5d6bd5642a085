/*!
 * # Health Check Module
 *
 * - Liveness (`/health`): the process is up and serving
 * - Readiness (`/health/ready`): the return store answers a ping
 */

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use utoipa::ToSchema;

use crate::AppState;

/// Basic health status
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Up,
    Down,
}

/// Health of one dependency
#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Overall health information
#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
pub struct HealthInfo {
    pub status: HealthStatus,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<ComponentHealth>,
}

impl HealthInfo {
    fn new(state: &AppState, status: HealthStatus, storage: Option<ComponentHealth>) -> Self {
        Self {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            uptime_seconds: state.uptime_seconds(),
            storage,
        }
    }
}

/// Liveness check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses((status = 200, description = "Service is alive", body = HealthInfo))
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    debug!("Health check endpoint called");
    Json(HealthInfo::new(&state, HealthStatus::Up, None))
}

/// Readiness check endpoint
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "health",
    responses(
        (status = 200, description = "Store reachable", body = HealthInfo),
        (status = 503, description = "Store unreachable", body = HealthInfo)
    )
)]
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let service = state.return_service();
    let backend = service.storage_backend().to_string();

    let storage = match service.check_storage().await {
        Ok(()) => ComponentHealth {
            status: HealthStatus::Up,
            backend,
            message: None,
        },
        Err(e) => {
            error!(error = %e, "Storage readiness check failed");
            ComponentHealth {
                status: HealthStatus::Down,
                backend,
                message: Some(e.response_message()),
            }
        }
    };

    let status = storage.status;
    let code = match status {
        HealthStatus::Up => StatusCode::OK,
        HealthStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    };

    (code, Json(HealthInfo::new(&state, status, Some(storage))))
}

pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/ready", get(readiness_check))
}
