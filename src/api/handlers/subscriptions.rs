//! Subscription handlers: create, list, get, edit, cancel, delete, and the
//! per-subscription instance and health views.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::api::dto::{
    CreateSubscriptionRequest, Page, PaginationParams, SubscriptionListParams,
    UpdateSubscriptionRequest,
};
use crate::app_state::AppState;
use crate::domain::{Actor, QosInstance, Subscription, SubscriptionId, SubscriptionStatus};
use crate::error::{ErrorResponse, PlatformError};
use crate::service::{HealthReport, InstanceExistence};

/// Request body for `PUT /subscriptions/{id}/status`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct StatusOverrideRequest {
    /// Target status; must be reachable from the current one.
    pub status: SubscriptionStatus,
}

/// `POST /subscriptions` — Start a subscription in PENDING.
///
/// # Errors
///
/// Returns [`PlatformError::Validation`] for blank restaurant fields or an
/// unavailable plan.
#[utoipa::path(
    post,
    path = "/api/v1/subscriptions",
    tag = "Subscriptions",
    summary = "Create subscription",
    request_body = CreateSubscriptionRequest,
    responses(
        (status = 201, description = "Subscription created in PENDING", body = Subscription),
        (status = 400, description = "Invalid restaurant details or plan", body = ErrorResponse),
        (status = 401, description = "Missing caller identity", body = ErrorResponse),
    )
)]
pub async fn create_subscription(
    State(state): State<AppState>,
    actor: Actor,
    Json(req): Json<CreateSubscriptionRequest>,
) -> Result<impl IntoResponse, PlatformError> {
    let sub = state
        .subscriptions
        .create_subscription(&actor, req.into())
        .await?;
    Ok((StatusCode::CREATED, Json(sub)))
}

/// `GET /subscriptions` — List visible subscriptions, newest first.
///
/// # Errors
///
/// Returns [`PlatformError`] on storage failure.
#[utoipa::path(
    get,
    path = "/api/v1/subscriptions",
    tag = "Subscriptions",
    summary = "List subscriptions",
    description = "Admins see every subscription; users see their own.",
    params(PaginationParams, SubscriptionListParams),
    responses(
        (status = 200, description = "Paginated subscriptions", body = Page<Subscription>),
        (status = 401, description = "Missing caller identity", body = ErrorResponse),
    )
)]
pub async fn list_subscriptions(
    State(state): State<AppState>,
    actor: Actor,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<SubscriptionListParams>,
) -> Result<impl IntoResponse, PlatformError> {
    let subs = state
        .subscriptions
        .list_subscriptions(&actor, filter.status)
        .await?;
    Ok(Json(pagination.paginate(subs)))
}

/// `GET /subscriptions/{id}` — Get one subscription.
///
/// # Errors
///
/// Returns [`PlatformError::NotFound`] if missing or not visible.
#[utoipa::path(
    get,
    path = "/api/v1/subscriptions/{id}",
    tag = "Subscriptions",
    summary = "Get subscription",
    params(("id" = SubscriptionId, Path, description = "Subscription identifier")),
    responses(
        (status = 200, description = "Subscription", body = Subscription),
        (status = 404, description = "Not found", body = ErrorResponse),
    )
)]
pub async fn get_subscription(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<SubscriptionId>,
) -> Result<impl IntoResponse, PlatformError> {
    Ok(Json(state.subscriptions.get_subscription(&actor, id).await?))
}

/// `PATCH /subscriptions/{id}` — Admin edit.
///
/// # Errors
///
/// Returns [`PlatformError::Forbidden`], validation, transition or
/// conflict errors.
#[utoipa::path(
    patch,
    path = "/api/v1/subscriptions/{id}",
    tag = "Subscriptions",
    summary = "Edit subscription",
    description = "Admin only. A changed `start_date` re-derives `end_date` unless `end_date` is also given.",
    params(("id" = SubscriptionId, Path, description = "Subscription identifier")),
    request_body = UpdateSubscriptionRequest,
    responses(
        (status = 200, description = "Updated subscription", body = Subscription),
        (status = 403, description = "Not an admin", body = ErrorResponse),
        (status = 409, description = "Concurrent change", body = ErrorResponse),
        (status = 422, description = "Transition not allowed", body = ErrorResponse),
    )
)]
pub async fn update_subscription(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<SubscriptionId>,
    Json(req): Json<UpdateSubscriptionRequest>,
) -> Result<impl IntoResponse, PlatformError> {
    let sub = state
        .subscriptions
        .update_subscription(&actor, id, req.into())
        .await?;
    Ok(Json(sub))
}

/// `PUT /subscriptions/{id}/status` — Admin status override.
///
/// # Errors
///
/// Returns [`PlatformError::InvalidTransition`] when the table forbids the
/// move, including re-setting the current status.
#[utoipa::path(
    put,
    path = "/api/v1/subscriptions/{id}/status",
    tag = "Subscriptions",
    summary = "Override subscription status",
    params(("id" = SubscriptionId, Path, description = "Subscription identifier")),
    request_body = StatusOverrideRequest,
    responses(
        (status = 200, description = "Updated subscription", body = Subscription),
        (status = 403, description = "Not an admin", body = ErrorResponse),
        (status = 422, description = "Transition not allowed", body = ErrorResponse),
    )
)]
pub async fn update_status(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<SubscriptionId>,
    Json(req): Json<StatusOverrideRequest>,
) -> Result<impl IntoResponse, PlatformError> {
    let sub = state
        .subscriptions
        .update_status(&actor, id, req.status)
        .await?;
    Ok(Json(sub))
}

/// `POST /subscriptions/{id}/cancel` — Cancel a subscription.
///
/// # Errors
///
/// Returns [`PlatformError::InvalidTransition`] if already terminal.
#[utoipa::path(
    post,
    path = "/api/v1/subscriptions/{id}/cancel",
    tag = "Subscriptions",
    summary = "Cancel subscription",
    params(("id" = SubscriptionId, Path, description = "Subscription identifier")),
    responses(
        (status = 200, description = "Cancelled subscription", body = Subscription),
        (status = 404, description = "Not found", body = ErrorResponse),
        (status = 422, description = "Already terminal", body = ErrorResponse),
    )
)]
pub async fn cancel_subscription(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<SubscriptionId>,
) -> Result<impl IntoResponse, PlatformError> {
    Ok(Json(
        state.subscriptions.cancel_subscription(&actor, id).await?,
    ))
}

/// `DELETE /subscriptions/{id}` — Admin soft delete.
///
/// # Errors
///
/// Returns [`PlatformError::Forbidden`] or [`PlatformError::NotFound`].
#[utoipa::path(
    delete,
    path = "/api/v1/subscriptions/{id}",
    tag = "Subscriptions",
    summary = "Delete subscription",
    description = "Soft delete. The instance, if any, is left in place.",
    params(("id" = SubscriptionId, Path, description = "Subscription identifier")),
    responses(
        (status = 200, description = "Deleted subscription", body = Subscription),
        (status = 403, description = "Not an admin", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse),
    )
)]
pub async fn delete_subscription(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<SubscriptionId>,
) -> Result<impl IntoResponse, PlatformError> {
    Ok(Json(
        state.subscriptions.delete_subscription(&actor, id).await?,
    ))
}

/// `GET /subscriptions/{id}/qos-instance` — The subscription's instance.
///
/// # Errors
///
/// Returns [`PlatformError::NotFound`] when no live instance exists.
#[utoipa::path(
    get,
    path = "/api/v1/subscriptions/{id}/qos-instance",
    tag = "Subscriptions",
    summary = "Get instance of subscription",
    params(("id" = SubscriptionId, Path, description = "Subscription identifier")),
    responses(
        (status = 200, description = "Live instance", body = QosInstance),
        (status = 404, description = "No instance", body = ErrorResponse),
    )
)]
pub async fn get_subscription_instance(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<SubscriptionId>,
) -> Result<impl IntoResponse, PlatformError> {
    state
        .instances
        .get_instance_by_subscription(&actor, id)
        .await?
        .map(Json)
        .ok_or_else(|| PlatformError::not_found("qos instance for subscription", id))
}

/// `GET /subscriptions/{id}/qos-instance/exists` — Existence check.
///
/// # Errors
///
/// Returns [`PlatformError::NotFound`] if the subscription is not visible.
#[utoipa::path(
    get,
    path = "/api/v1/subscriptions/{id}/qos-instance/exists",
    tag = "Subscriptions",
    summary = "Instance existence check",
    params(("id" = SubscriptionId, Path, description = "Subscription identifier")),
    responses(
        (status = 200, description = "Existence", body = InstanceExistence),
        (status = 404, description = "Subscription not found", body = ErrorResponse),
    )
)]
pub async fn instance_exists(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<SubscriptionId>,
) -> Result<impl IntoResponse, PlatformError> {
    Ok(Json(
        state.reconciler.has_existing_instance(&actor, id).await?,
    ))
}

/// `GET /subscriptions/{id}/qos-health` — Live health view.
///
/// # Errors
///
/// Returns [`PlatformError::NotFound`] if the subscription is not visible.
#[utoipa::path(
    get,
    path = "/api/v1/subscriptions/{id}/qos-health",
    tag = "Subscriptions",
    summary = "Instance health",
    description = "Probes the instance URLs and merges the result with the declared statuses. Never changes stored status.",
    params(("id" = SubscriptionId, Path, description = "Subscription identifier")),
    responses(
        (status = 200, description = "Instance and health snapshot", body = HealthReport),
        (status = 404, description = "Subscription not found", body = ErrorResponse),
    )
)]
pub async fn subscription_health(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<SubscriptionId>,
) -> Result<impl IntoResponse, PlatformError> {
    Ok(Json(state.health.get_health(&actor, id).await?))
}

/// Subscription routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/subscriptions",
            post(create_subscription).get(list_subscriptions),
        )
        .route(
            "/subscriptions/{id}",
            get(get_subscription)
                .patch(update_subscription)
                .delete(delete_subscription),
        )
        .route("/subscriptions/{id}/status", put(update_status))
        .route("/subscriptions/{id}/cancel", post(cancel_subscription))
        .route(
            "/subscriptions/{id}/qos-instance",
            get(get_subscription_instance),
        )
        .route(
            "/subscriptions/{id}/qos-instance/exists",
            get(instance_exists),
        )
        .route("/subscriptions/{id}/qos-health", get(subscription_health))
}
