//! Liveness of the lifecycle service itself.
//!
//! Tenant instances are checked per subscription through `qos-health`; this
//! endpoint only says the gateway process is up.

use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::app_state::AppState;

/// Liveness body.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    timestamp: DateTime<Utc>,
}

/// `GET /health`
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Gateway liveness",
    description = "Reports that the subscription and provisioning service is running, \
                   with its build version. Does not touch the store or tenant instances.",
    responses(
        (status = 200, description = "Gateway is up", body = HealthResponse),
    )
)]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now(),
    })
}

/// Routes mounted at the root, outside `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_handler))
}
