//! Platform error types with HTTP status code mapping.
//!
//! [`PlatformError`] is the central error type for the service. Each variant
//! maps to a machine-readable kind, a numeric code and an HTTP status, and
//! renders as a structured JSON error response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{InstanceId, ServiceStatus, SubscriptionStatus};

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2101,
///     "kind": "duplicate_instance",
///     "message": "subscription 4f0c... already has instance 9a1e...",
///     "details": { "instance_id": "9a1e...", "front_end_url": "..." }
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code, kind and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see code ranges on [`PlatformError`]).
    pub code: u32,
    /// Machine-readable error kind (e.g. `"invalid_transition"`).
    pub kind: String,
    /// Human-readable error message.
    pub message: String,
    /// Optional structured details (conflicting entity, etc.).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Identifying details of an instance that blocked a creation attempt.
///
/// Carried by [`PlatformError::DuplicateInstance`] so the caller can show
/// the conflicting instance instead of a bare "conflict".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ExistingInstance {
    /// Identifier of the live instance.
    pub instance_id: InstanceId,
    /// Database name of the live instance.
    pub db_name: Option<String>,
    /// Frontend URL of the live instance.
    pub front_end_url: Option<String>,
    /// Backend URL of the live instance.
    pub back_end_url: Option<String>,
}

/// Service-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category              | HTTP Status                      |
/// |-----------|-----------------------|----------------------------------|
/// | 1000–1999 | Validation / identity | 400 / 401 / 403                  |
/// | 2000–2999 | State / not found     | 404 / 409 / 422                  |
/// | 3000–3999 | Server                | 500 Internal Server Error        |
/// | 4000–4999 | Payment provider      | 400 / 502                        |
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// Malformed or missing input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The caller did not present a usable identity.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The caller is not allowed to perform the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Referenced entity is absent or soft-deleted.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind (e.g. `"subscription"`).
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// A business precondition was not met.
    #[error("not eligible: {0}")]
    NotEligible(String),

    /// The subscription already has a live instance.
    #[error(
        "subscription {subscription_id} already has instance {}",
        .existing.instance_id
    )]
    DuplicateInstance {
        /// Subscription the creation targeted.
        subscription_id: uuid::Uuid,
        /// The instance that already references it.
        existing: ExistingInstance,
    },

    /// Subscription status change not in the transition table.
    #[error("invalid subscription transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status.
        from: SubscriptionStatus,
        /// Requested status.
        to: SubscriptionStatus,
    },

    /// Per-service status change not in the service transition table.
    #[error("invalid {service} status transition: {from} -> {to}")]
    InvalidServiceTransition {
        /// Service name (`"database"`, `"frontend"`, `"backend"`).
        service: &'static str,
        /// Current status.
        from: ServiceStatus,
        /// Requested status.
        to: ServiceStatus,
    },

    /// The entity changed underneath the caller.
    #[error("state conflict: {0}")]
    StateConflict(String),

    /// A webhook could not be authenticated or parsed.
    #[error("payment verification failed: {0}")]
    PaymentVerification(String),

    /// The payment provider rejected or failed a request.
    #[error("payment provider error: {0}")]
    PaymentProvider(String),

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PlatformError {
    /// Shorthand for a [`PlatformError::NotFound`].
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Validation(_) => 1001,
            Self::Unauthorized(_) => 1101,
            Self::Forbidden(_) => 1102,
            Self::NotFound { .. } => 2001,
            Self::NotEligible(_) => 2002,
            Self::DuplicateInstance { .. } => 2101,
            Self::InvalidTransition { .. } => 2201,
            Self::InvalidServiceTransition { .. } => 2202,
            Self::StateConflict(_) => 2301,
            Self::Persistence(_) => 3001,
            Self::Internal(_) => 3000,
            Self::PaymentVerification(_) => 4001,
            Self::PaymentProvider(_) => 4002,
        }
    }

    /// Returns the machine-readable kind for this variant.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound { .. } => "not_found",
            Self::NotEligible(_) => "not_eligible",
            Self::DuplicateInstance { .. } => "duplicate_instance",
            Self::InvalidTransition { .. } | Self::InvalidServiceTransition { .. } => {
                "invalid_transition"
            }
            Self::StateConflict(_) => "state_conflict",
            Self::PaymentVerification(_) => "payment_verification",
            Self::PaymentProvider(_) => "payment_provider",
            Self::Persistence(_) => "persistence",
            Self::Internal(_) => "internal",
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::PaymentVerification(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::DuplicateInstance { .. } | Self::StateConflict(_) => StatusCode::CONFLICT,
            Self::NotEligible(_)
            | Self::InvalidTransition { .. }
            | Self::InvalidServiceTransition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::PaymentProvider(_) => StatusCode::BAD_GATEWAY,
            Self::Persistence(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Structured details attached to the JSON body, if any.
    #[must_use]
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::DuplicateInstance {
                subscription_id,
                existing,
            } => Some(serde_json::json!({
                "subscription_id": subscription_id,
                "instance_id": existing.instance_id,
                "db_name": existing.db_name,
                "front_end_url": existing.front_end_url,
                "back_end_url": existing.back_end_url,
            })),
            Self::InvalidTransition { from, to } => Some(serde_json::json!({
                "from": from,
                "to": to,
                "allowed": from.allowed_targets(),
            })),
            Self::InvalidServiceTransition { service, from, to } => Some(serde_json::json!({
                "service": service,
                "from": from,
                "to": to,
            })),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for PlatformError {
    fn from(err: sqlx::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl IntoResponse for PlatformError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                kind: self.kind().to_string(),
                message: self.to_string(),
                details: self.details(),
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
