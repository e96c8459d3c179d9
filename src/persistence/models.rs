//! Database row models and their conversions to domain types.
//!
//! Rows mirror the column types PostgreSQL actually stores (`BIGINT` for
//! money and counters, `TEXT` for enums). Conversions into the domain are
//! fallible because a row written by another tool may violate the domain's
//! invariants.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{Payment, QosInstance, RestaurantInfo, ServicePlan, Subscription};
use crate::error::PlatformError;

/// A row from the `service_plans` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PlanRow {
    /// Plan id.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Monthly price.
    pub price: i64,
    /// Marketing description.
    pub description: String,
    /// Purchasable flag.
    pub active: bool,
}

impl TryFrom<PlanRow> for ServicePlan {
    type Error = PlatformError;

    fn try_from(row: PlanRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            name: row.name,
            price: to_unsigned("service_plans.price", row.price)?,
            description: row.description,
            active: row.active,
        })
    }
}

/// A row from the `subscriptions` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SubscriptionRow {
    /// Subscription id.
    pub id: Uuid,
    /// Owner.
    pub user_id: Uuid,
    /// Purchased plan.
    pub service_plan_id: Uuid,
    /// Restaurant name.
    pub restaurant_name: String,
    /// Restaurant address.
    pub restaurant_address: String,
    /// Restaurant phone.
    pub restaurant_phone: String,
    /// Restaurant type.
    pub restaurant_type: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Duration wire name.
    pub duration: String,
    /// Status wire name.
    pub status: String,
    /// Paid period start.
    pub start_date: Option<DateTime<Utc>>,
    /// Paid period end.
    pub end_date: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,
    /// Optimistic-concurrency counter.
    pub revision: i64,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = PlatformError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            user_id: row.user_id.into(),
            service_plan_id: row.service_plan_id.into(),
            restaurant: RestaurantInfo {
                name: row.restaurant_name,
                address: row.restaurant_address,
                phone: row.restaurant_phone,
                restaurant_type: row.restaurant_type,
                description: row.description,
            },
            duration: row.duration.parse().map_err(corrupt)?,
            status: row.status.parse().map_err(corrupt)?,
            start_date: row.start_date,
            end_date: row.end_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
            revision: to_unsigned("subscriptions.revision", row.revision)?,
        })
    }
}

/// A row from the `qos_instances` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InstanceRow {
    /// Instance id.
    pub id: Uuid,
    /// Owning subscription.
    pub subscription_id: Uuid,
    /// Owner.
    pub user_id: Uuid,
    /// Tenant database name.
    pub db_name: Option<String>,
    /// Frontend URL.
    pub front_end_url: Option<String>,
    /// Backend URL.
    pub back_end_url: Option<String>,
    /// Database status wire name.
    pub status_db: String,
    /// Frontend status wire name.
    pub status_fe: String,
    /// Backend status wire name.
    pub status_be: String,
    /// Response time (ms).
    pub response_time: Option<i32>,
    /// Uptime percentage.
    pub uptime: Option<f64>,
    /// Database size (bytes).
    pub db_size: Option<i64>,
    /// Application version.
    pub version: Option<String>,
    /// Last deployment.
    pub deployed_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,
    /// Optimistic-concurrency counter.
    pub revision: i64,
}

impl TryFrom<InstanceRow> for QosInstance {
    type Error = PlatformError;

    fn try_from(row: InstanceRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            subscription_id: row.subscription_id.into(),
            user_id: row.user_id.into(),
            db_name: row.db_name,
            front_end_url: row.front_end_url,
            back_end_url: row.back_end_url,
            status_db: row.status_db.parse().map_err(corrupt)?,
            status_fe: row.status_fe.parse().map_err(corrupt)?,
            status_be: row.status_be.parse().map_err(corrupt)?,
            response_time: row
                .response_time
                .map(|v| u32::try_from(v).map_err(|_| negative("qos_instances.response_time")))
                .transpose()?,
            uptime: row.uptime,
            db_size: row
                .db_size
                .map(|v| to_unsigned("qos_instances.db_size", v))
                .transpose()?,
            version: row.version,
            deployed_at: row.deployed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
            revision: to_unsigned("qos_instances.revision", row.revision)?,
        })
    }
}

/// A row from the `payments` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PaymentRow {
    /// Payment id.
    pub id: Uuid,
    /// Subscription being paid for.
    pub subscription_id: Uuid,
    /// Provider order code.
    pub order_code: i64,
    /// Amount.
    pub amount: i64,
    /// Status wire name.
    pub status: String,
    /// Provider transaction reference.
    pub provider_reference: Option<String>,
    /// Checkout page.
    pub checkout_url: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = PlatformError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            subscription_id: row.subscription_id.into(),
            order_code: row.order_code,
            amount: to_unsigned("payments.amount", row.amount)?,
            status: row.status.parse().map_err(corrupt)?,
            provider_reference: row.provider_reference,
            checkout_url: row.checkout_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Converts a domain counter to a `BIGINT` bind value.
///
/// # Errors
///
/// Returns [`PlatformError::Validation`] if the value exceeds `i64::MAX`.
pub fn to_signed(field: &str, value: u64) -> Result<i64, PlatformError> {
    i64::try_from(value)
        .map_err(|_| PlatformError::Validation(format!("{field} is too large: {value}")))
}

fn to_unsigned(column: &str, value: i64) -> Result<u64, PlatformError> {
    u64::try_from(value).map_err(|_| negative(column))
}

fn negative(column: &str) -> PlatformError {
    PlatformError::Persistence(format!("negative value in {column}"))
}

fn corrupt(err: PlatformError) -> PlatformError {
    PlatformError::Persistence(format!("corrupt row: {err}"))
}
