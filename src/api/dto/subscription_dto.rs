//! Subscription DTOs for create, update and list operations.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::domain::{
    PlanId, RestaurantInfo, SubscriptionDuration, SubscriptionStatus,
};
use crate::service::{NewSubscription, SubscriptionPatch};

/// Request body for `POST /subscriptions`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateSubscriptionRequest {
    /// Restaurant name.
    pub restaurant_name: String,
    /// Street address.
    pub restaurant_address: String,
    /// Contact phone.
    pub restaurant_phone: String,
    /// Venue type.
    pub restaurant_type: String,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Plan to purchase.
    pub service_plan_id: PlanId,
    /// Purchased length.
    pub duration: SubscriptionDuration,
}

impl From<CreateSubscriptionRequest> for NewSubscription {
    fn from(req: CreateSubscriptionRequest) -> Self {
        Self {
            plan_id: req.service_plan_id,
            restaurant: RestaurantInfo {
                name: req.restaurant_name,
                address: req.restaurant_address,
                phone: req.restaurant_phone,
                restaurant_type: req.restaurant_type,
                description: req.description,
            },
            duration: req.duration,
        }
    }
}

/// Request body for `PATCH /subscriptions/{id}`. Omitted fields are left
/// unchanged.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateSubscriptionRequest {
    /// New status.
    #[serde(default)]
    pub status: Option<SubscriptionStatus>,
    /// New period start.
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    /// New period end.
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    /// New restaurant name.
    #[serde(default)]
    pub restaurant_name: Option<String>,
    /// New restaurant address.
    #[serde(default)]
    pub restaurant_address: Option<String>,
    /// New restaurant phone.
    #[serde(default)]
    pub restaurant_phone: Option<String>,
    /// New restaurant type.
    #[serde(default)]
    pub restaurant_type: Option<String>,
    /// New description.
    #[serde(default)]
    pub description: Option<String>,
}

impl From<UpdateSubscriptionRequest> for SubscriptionPatch {
    fn from(req: UpdateSubscriptionRequest) -> Self {
        Self {
            status: req.status,
            start_date: req.start_date,
            end_date: req.end_date,
            restaurant_name: req.restaurant_name,
            restaurant_address: req.restaurant_address,
            restaurant_phone: req.restaurant_phone,
            restaurant_type: req.restaurant_type,
            description: req.description,
        }
    }
}

/// Filter for `GET /subscriptions`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SubscriptionListParams {
    /// Only subscriptions in this status.
    #[serde(default)]
    pub status: Option<SubscriptionStatus>,
}
