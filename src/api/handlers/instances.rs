//! QoS instance handlers: provisioning, edits, status control.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};

use crate::api::dto::{
    CreateInstanceRequest, Page, PaginationParams, ServiceStatusRequest, UpdateInstanceResponse,
};
use crate::app_state::AppState;
use crate::domain::{Actor, BulkAction, InstanceId, InstancePatch, QosInstance, ServiceKind};
use crate::error::{ErrorResponse, PlatformError};

/// `POST /qos-instances` — Provision the instance of a PAID subscription.
///
/// # Errors
///
/// Returns [`PlatformError::NotEligible`] unless the subscription is PAID,
/// or [`PlatformError::DuplicateInstance`] when one already exists.
#[utoipa::path(
    post,
    path = "/api/v1/qos-instances",
    tag = "Instances",
    summary = "Create instance",
    description = "Admin only. At most one live instance exists per subscription; a second attempt returns 409 with the existing instance in `details`.",
    request_body = CreateInstanceRequest,
    responses(
        (status = 201, description = "Instance created", body = QosInstance),
        (status = 403, description = "Not an admin", body = ErrorResponse),
        (status = 409, description = "Instance already exists", body = ErrorResponse),
        (status = 422, description = "Subscription not PAID", body = ErrorResponse),
    )
)]
pub async fn create_instance(
    State(state): State<AppState>,
    actor: Actor,
    Json(req): Json<CreateInstanceRequest>,
) -> Result<impl IntoResponse, PlatformError> {
    let instance = state.instances.create_instance(&actor, req.into()).await?;
    Ok((StatusCode::CREATED, Json(instance)))
}

/// `GET /qos-instances` — List visible instances.
///
/// # Errors
///
/// Returns [`PlatformError`] on storage failure.
#[utoipa::path(
    get,
    path = "/api/v1/qos-instances",
    tag = "Instances",
    summary = "List instances",
    params(PaginationParams),
    responses(
        (status = 200, description = "Paginated instances", body = Page<QosInstance>),
    )
)]
pub async fn list_instances(
    State(state): State<AppState>,
    actor: Actor,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, PlatformError> {
    let instances = state.instances.list_instances(&actor).await?;
    Ok(Json(pagination.paginate(instances)))
}

/// `GET /qos-instances/{id}` — Get one instance.
///
/// # Errors
///
/// Returns [`PlatformError::NotFound`] if missing or not visible.
#[utoipa::path(
    get,
    path = "/api/v1/qos-instances/{id}",
    tag = "Instances",
    summary = "Get instance",
    params(("id" = InstanceId, Path, description = "Instance identifier")),
    responses(
        (status = 200, description = "Instance", body = QosInstance),
        (status = 404, description = "Not found", body = ErrorResponse),
    )
)]
pub async fn get_instance(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<InstanceId>,
) -> Result<impl IntoResponse, PlatformError> {
    Ok(Json(state.instances.get_instance(&actor, id).await?))
}

/// `PATCH /qos-instances/{id}` — Partial update.
///
/// # Errors
///
/// Returns validation, access or conflict errors.
#[utoipa::path(
    patch,
    path = "/api/v1/qos-instances/{id}",
    tag = "Instances",
    summary = "Edit instance",
    description = "Admin only. Only fields that differ are written; an all-equal patch returns `updated: false`.",
    params(("id" = InstanceId, Path, description = "Instance identifier")),
    request_body = InstancePatch,
    responses(
        (status = 200, description = "Update outcome", body = UpdateInstanceResponse),
        (status = 400, description = "Invalid field", body = ErrorResponse),
        (status = 409, description = "Concurrent change", body = ErrorResponse),
    )
)]
pub async fn update_instance(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<InstanceId>,
    Json(patch): Json<InstancePatch>,
) -> Result<impl IntoResponse, PlatformError> {
    let outcome = state.instances.update_instance(&actor, id, &patch).await?;
    Ok(Json(UpdateInstanceResponse::from(outcome)))
}

/// `DELETE /qos-instances/{id}` — Soft delete.
///
/// # Errors
///
/// Returns [`PlatformError::Forbidden`] or [`PlatformError::NotFound`].
#[utoipa::path(
    delete,
    path = "/api/v1/qos-instances/{id}",
    tag = "Instances",
    summary = "Delete instance",
    params(("id" = InstanceId, Path, description = "Instance identifier")),
    responses(
        (status = 200, description = "Deleted instance", body = QosInstance),
        (status = 404, description = "Not found", body = ErrorResponse),
    )
)]
pub async fn delete_instance(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<InstanceId>,
) -> Result<impl IntoResponse, PlatformError> {
    Ok(Json(state.instances.delete_instance(&actor, id).await?))
}

async fn bulk(
    state: &AppState,
    actor: &Actor,
    id: InstanceId,
    action: BulkAction,
) -> Result<Json<QosInstance>, PlatformError> {
    Ok(Json(
        state.instances.apply_bulk_action(actor, id, action).await?,
    ))
}

/// `POST /qos-instances/{id}/deploy-all` — All services to DEPLOYING.
///
/// # Errors
///
/// Returns [`PlatformError::Forbidden`] or [`PlatformError::NotFound`].
#[utoipa::path(
    post,
    path = "/api/v1/qos-instances/{id}/deploy-all",
    tag = "Instances",
    summary = "Deploy all services",
    params(("id" = InstanceId, Path, description = "Instance identifier")),
    responses(
        (status = 200, description = "Updated instance", body = QosInstance),
        (status = 404, description = "Not found", body = ErrorResponse),
    )
)]
pub async fn deploy_all(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<InstanceId>,
) -> Result<impl IntoResponse, PlatformError> {
    bulk(&state, &actor, id, BulkAction::DeployAll).await
}

/// `POST /qos-instances/{id}/activate-all` — All services to ACTIVE.
///
/// # Errors
///
/// Returns [`PlatformError::Forbidden`] or [`PlatformError::NotFound`].
#[utoipa::path(
    post,
    path = "/api/v1/qos-instances/{id}/activate-all",
    tag = "Instances",
    summary = "Activate all services",
    params(("id" = InstanceId, Path, description = "Instance identifier")),
    responses(
        (status = 200, description = "Updated instance", body = QosInstance),
        (status = 404, description = "Not found", body = ErrorResponse),
    )
)]
pub async fn activate_all(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<InstanceId>,
) -> Result<impl IntoResponse, PlatformError> {
    bulk(&state, &actor, id, BulkAction::ActivateAll).await
}

/// `POST /qos-instances/{id}/maintenance-all` — All services to MAINTENANCE.
///
/// # Errors
///
/// Returns [`PlatformError::Forbidden`] or [`PlatformError::NotFound`].
#[utoipa::path(
    post,
    path = "/api/v1/qos-instances/{id}/maintenance-all",
    tag = "Instances",
    summary = "Put all services in maintenance",
    params(("id" = InstanceId, Path, description = "Instance identifier")),
    responses(
        (status = 200, description = "Updated instance", body = QosInstance),
        (status = 404, description = "Not found", body = ErrorResponse),
    )
)]
pub async fn maintenance_all(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<InstanceId>,
) -> Result<impl IntoResponse, PlatformError> {
    bulk(&state, &actor, id, BulkAction::MaintenanceAll).await
}

/// `PUT /qos-instances/{id}/services/{service}/status` — One service.
///
/// # Errors
///
/// Returns [`PlatformError::InvalidServiceTransition`] for a move the
/// per-service table forbids, or [`PlatformError::Validation`] for an
/// unknown service name.
#[utoipa::path(
    put,
    path = "/api/v1/qos-instances/{id}/services/{service}/status",
    tag = "Instances",
    summary = "Set one service status",
    description = "Follows the per-service table. `service` is `database`, `frontend` or `backend` (or `db`, `fe`, `be`).",
    params(
        ("id" = InstanceId, Path, description = "Instance identifier"),
        ("service" = String, Path, description = "Service name"),
    ),
    request_body = ServiceStatusRequest,
    responses(
        (status = 200, description = "Updated instance", body = QosInstance),
        (status = 400, description = "Unknown service", body = ErrorResponse),
        (status = 422, description = "Transition not allowed", body = ErrorResponse),
    )
)]
pub async fn set_service_status(
    State(state): State<AppState>,
    actor: Actor,
    Path((id, service)): Path<(InstanceId, String)>,
    Json(req): Json<ServiceStatusRequest>,
) -> Result<impl IntoResponse, PlatformError> {
    let service: ServiceKind = service.parse()?;
    let instance = state
        .instances
        .set_service_status(&actor, id, service, req.status)
        .await?;
    Ok(Json(instance))
}

/// Instance routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/qos-instances", post(create_instance).get(list_instances))
        .route(
            "/qos-instances/{id}",
            get(get_instance)
                .patch(update_instance)
                .delete(delete_instance),
        )
        .route("/qos-instances/{id}/deploy-all", post(deploy_all))
        .route("/qos-instances/{id}/activate-all", post(activate_all))
        .route("/qos-instances/{id}/maintenance-all", post(maintenance_all))
        .route(
            "/qos-instances/{id}/services/{service}/status",
            put(set_service_status),
        )
}
