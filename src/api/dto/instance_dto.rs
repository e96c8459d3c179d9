//! QoS instance DTOs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{QosInstance, ServiceStatus, SubscriptionId, UserId};
use crate::service::{NewInstance, UpdateOutcome};

/// Request body for `POST /qos-instances`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateInstanceRequest {
    /// Subscription to provision for; must be PAID.
    pub subscription_id: SubscriptionId,
    /// Owner; must match the subscription if given.
    #[serde(default)]
    pub user_id: Option<UserId>,
    /// Tenant database name.
    #[serde(default)]
    pub db_name: Option<String>,
    /// Frontend URL.
    #[serde(default)]
    pub front_end_url: Option<String>,
    /// Backend URL.
    #[serde(default)]
    pub back_end_url: Option<String>,
    /// Application version.
    #[serde(default)]
    pub version: Option<String>,
    /// Initial database status; `INACTIVE` when omitted.
    #[serde(default)]
    pub status_db: Option<ServiceStatus>,
    /// Initial frontend status; `INACTIVE` when omitted.
    #[serde(default)]
    pub status_fe: Option<ServiceStatus>,
    /// Initial backend status; `INACTIVE` when omitted.
    #[serde(default)]
    pub status_be: Option<ServiceStatus>,
}

impl From<CreateInstanceRequest> for NewInstance {
    fn from(req: CreateInstanceRequest) -> Self {
        Self {
            subscription_id: req.subscription_id,
            user_id: req.user_id,
            db_name: req.db_name,
            front_end_url: req.front_end_url,
            back_end_url: req.back_end_url,
            version: req.version,
            status_db: req.status_db,
            status_fe: req.status_fe,
            status_be: req.status_be,
        }
    }
}

/// Response body for `PATCH /qos-instances/{id}`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UpdateInstanceResponse {
    /// `false` when every supplied field already matched.
    pub updated: bool,
    /// The stored instance, when something changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qos_instance: Option<QosInstance>,
    /// Explanation for a no-op.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<UpdateOutcome> for UpdateInstanceResponse {
    fn from(outcome: UpdateOutcome) -> Self {
        match outcome {
            UpdateOutcome::Updated(instance) => Self {
                updated: true,
                qos_instance: Some(instance),
                message: None,
            },
            UpdateOutcome::NothingToUpdate => Self {
                updated: false,
                qos_instance: None,
                message: Some("nothing to update".to_string()),
            },
        }
    }
}

/// Request body for `PUT /qos-instances/{id}/services/{service}/status`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ServiceStatusRequest {
    /// Target status.
    pub status: ServiceStatus,
}
