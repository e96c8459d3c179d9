//! Plan catalog handlers. Public: no caller identity required.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{PlanListParams, PricingParams, PricingResponse};
use crate::app_state::AppState;
use crate::domain::{PlanId, ServicePlan};
use crate::error::{ErrorResponse, PlatformError};

/// `GET /plans` — List purchasable plans.
#[utoipa::path(
    get,
    path = "/api/v1/plans",
    tag = "Plans",
    summary = "List service plans",
    description = "Returns the plan catalog sorted by price. Inactive plans are hidden unless `include_inactive=true`.",
    params(PlanListParams),
    responses(
        (status = 200, description = "Plan catalog", body = Vec<ServicePlan>),
    )
)]
pub async fn list_plans(
    State(state): State<AppState>,
    Query(params): Query<PlanListParams>,
) -> impl IntoResponse {
    Json(state.subscriptions.catalog().list(params.include_inactive))
}

/// `GET /plans/{id}` — Get a single plan.
///
/// # Errors
///
/// Returns [`PlatformError::NotFound`] for unknown plans.
#[utoipa::path(
    get,
    path = "/api/v1/plans/{id}",
    tag = "Plans",
    summary = "Get plan",
    params(("id" = PlanId, Path, description = "Plan identifier")),
    responses(
        (status = 200, description = "Plan", body = ServicePlan),
        (status = 404, description = "Plan not found", body = ErrorResponse),
    )
)]
pub async fn get_plan(
    State(state): State<AppState>,
    Path(id): Path<PlanId>,
) -> Result<impl IntoResponse, PlatformError> {
    let plan = state.subscriptions.catalog().get(id)?.clone();
    Ok(Json(plan))
}

/// `GET /plans/{id}/pricing` — Price a plan for a duration.
///
/// # Errors
///
/// Returns [`PlatformError::NotFound`] for unknown plans.
#[utoipa::path(
    get,
    path = "/api/v1/plans/{id}/pricing",
    tag = "Plans",
    summary = "Pricing preview",
    description = "Computes `price × months` for the requested duration, the same total charged at checkout.",
    params(("id" = PlanId, Path, description = "Plan identifier"), PricingParams),
    responses(
        (status = 200, description = "Price quote", body = PricingResponse),
        (status = 404, description = "Plan not found", body = ErrorResponse),
    )
)]
pub async fn get_pricing(
    State(state): State<AppState>,
    Path(id): Path<PlanId>,
    Query(params): Query<PricingParams>,
) -> Result<impl IntoResponse, PlatformError> {
    let quote = state.subscriptions.quote(id, params.duration)?;
    Ok(Json(PricingResponse::from(quote)))
}

/// Plan routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/plans", get(list_plans))
        .route("/plans/{id}", get(get_plan))
        .route("/plans/{id}/pricing", get(get_pricing))
}
