use super::common::success_response;
use crate::{db, handlers::AppState, ApiResponse};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::warn;
use utoipa::ToSchema;

/// Tracks application start time for uptime calculation
static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize the start time (call this on application startup)
pub fn init_start_time() {
    let _ = START_TIME.get_or_init(Instant::now);
}

fn uptime_secs() -> u64 {
    START_TIME.get_or_init(Instant::now).elapsed().as_secs()
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthStatus {
    pub status: String,
    pub database: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceStatus {
    pub name: String,
    pub version: String,
    pub environment: String,
    pub uptime_secs: u64,
}

/// Liveness plus a database ping
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service and database are up", body = HealthStatus),
        (status = 503, description = "Database unreachable")
    ),
    tag = "health"
)]
pub async fn health(State(state): State<AppState>) -> Response {
    match db::check_connection(&state.db).await {
        Ok(()) => success_response(HealthStatus {
            status: "healthy".to_string(),
            database: "up".to_string(),
        }),
        Err(e) => {
            warn!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse::<HealthStatus>::failure(
                    "unavailable",
                    "Database is unreachable",
                )),
            )
                .into_response()
        }
    }
}

/// Build and runtime information
#[utoipa::path(
    get,
    path = "/status",
    responses((status = 200, description = "Service status", body = ServiceStatus)),
    tag = "health"
)]
pub async fn status(State(state): State<AppState>) -> Response {
    success_response(ServiceStatus {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        environment: state.config.environment.clone(),
        uptime_secs: uptime_secs(),
    })
}
