//! Admin-only endpoints.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::app_state::AppState;
use crate::domain::{Actor, Inconsistency};
use crate::error::{ErrorResponse, PlatformError};

/// `GET /admin/reconciliation` — Subscription/instance inconsistencies.
///
/// # Errors
///
/// Returns [`PlatformError::Forbidden`] for non-admins.
#[utoipa::path(
    get,
    path = "/api/v1/admin/reconciliation",
    tag = "Admin",
    summary = "Reconciliation report",
    description = "Flags ACTIVE subscriptions without an instance and instances whose subscription is terminal or gone. Nothing is repaired.",
    responses(
        (status = 200, description = "Inconsistencies", body = Vec<Inconsistency>),
        (status = 403, description = "Not an admin", body = ErrorResponse),
    )
)]
pub async fn reconciliation(
    State(state): State<AppState>,
    actor: Actor,
) -> Result<impl IntoResponse, PlatformError> {
    Ok(Json(state.reconciler.find_inconsistencies(&actor).await?))
}

/// Admin routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/admin/reconciliation", get(reconciliation))
}
