//! Domain events reflecting lifecycle mutations.
//!
//! Every successful write emits a [`LifecycleEvent`] through the
//! [`super::EventBus`]. Events are appended to the PostgreSQL audit log
//! when persistence is enabled.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::instance::{BulkAction, ServiceStatus};
use super::payment::PaymentStatus;
use super::subscription::SubscriptionStatus;
use super::{InstanceId, PaymentId, PlanId, SubscriptionId, UserId};

/// Domain event emitted after every lifecycle mutation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// A subscription was created in PENDING.
    SubscriptionCreated {
        /// Subscription identifier.
        subscription_id: SubscriptionId,
        /// Owner.
        user_id: UserId,
        /// Purchased plan.
        plan_id: PlanId,
        /// Creation timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A subscription changed status.
    SubscriptionStatusChanged {
        /// Subscription identifier.
        subscription_id: SubscriptionId,
        /// Previous status.
        from: SubscriptionStatus,
        /// New status.
        to: SubscriptionStatus,
        /// Who triggered it (`"payment"`, `"admin"`, `"owner"`, `"sweeper"`).
        trigger: &'static str,
        /// Transition timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Non-status subscription fields were edited by an admin.
    SubscriptionUpdated {
        /// Subscription identifier.
        subscription_id: SubscriptionId,
        /// Names of the changed fields.
        fields: Vec<&'static str>,
        /// Edit timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A subscription was soft-deleted.
    SubscriptionDeleted {
        /// Subscription identifier.
        subscription_id: SubscriptionId,
        /// Deletion timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A checkout link was issued.
    PaymentInitiated {
        /// Payment identifier.
        payment_id: PaymentId,
        /// Subscription being paid for.
        subscription_id: SubscriptionId,
        /// Provider order code.
        order_code: i64,
        /// Amount in minor units.
        amount: u64,
        /// Issue timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A verified provider result settled a payment.
    PaymentSettled {
        /// Payment identifier.
        payment_id: PaymentId,
        /// Subscription being paid for.
        subscription_id: SubscriptionId,
        /// Final payment status.
        status: PaymentStatus,
        /// Settlement timestamp.
        timestamp: DateTime<Utc>,
    },

    /// An instance was provisioned.
    InstanceCreated {
        /// Instance identifier.
        instance_id: InstanceId,
        /// Owning subscription.
        subscription_id: SubscriptionId,
        /// Creation timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Instance fields changed.
    InstanceUpdated {
        /// Instance identifier.
        instance_id: InstanceId,
        /// Owning subscription.
        subscription_id: SubscriptionId,
        /// Names of the changed fields.
        fields: Vec<&'static str>,
        /// Edit timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A bulk status action was applied to all three services.
    InstanceBulkStatus {
        /// Instance identifier.
        instance_id: InstanceId,
        /// Action applied.
        action: BulkAction,
        /// Resulting status of every service.
        status: ServiceStatus,
        /// Edit timestamp.
        timestamp: DateTime<Utc>,
    },

    /// An instance was soft-deleted.
    InstanceDeleted {
        /// Instance identifier.
        instance_id: InstanceId,
        /// Owning subscription.
        subscription_id: SubscriptionId,
        /// Deletion timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl LifecycleEvent {
    /// Identifier of the aggregate the event belongs to.
    #[must_use]
    pub fn aggregate_id(&self) -> uuid::Uuid {
        match self {
            Self::SubscriptionCreated {
                subscription_id, ..
            }
            | Self::SubscriptionStatusChanged {
                subscription_id, ..
            }
            | Self::SubscriptionUpdated {
                subscription_id, ..
            }
            | Self::SubscriptionDeleted {
                subscription_id, ..
            } => (*subscription_id).into(),
            Self::PaymentInitiated { payment_id, .. } | Self::PaymentSettled { payment_id, .. } => {
                (*payment_id).into()
            }
            Self::InstanceCreated { instance_id, .. }
            | Self::InstanceUpdated { instance_id, .. }
            | Self::InstanceBulkStatus { instance_id, .. }
            | Self::InstanceDeleted { instance_id, .. } => (*instance_id).into(),
        }
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::SubscriptionCreated { .. } => "subscription_created",
            Self::SubscriptionStatusChanged { .. } => "subscription_status_changed",
            Self::SubscriptionUpdated { .. } => "subscription_updated",
            Self::SubscriptionDeleted { .. } => "subscription_deleted",
            Self::PaymentInitiated { .. } => "payment_initiated",
            Self::PaymentSettled { .. } => "payment_settled",
            Self::InstanceCreated { .. } => "instance_created",
            Self::InstanceUpdated { .. } => "instance_updated",
            Self::InstanceBulkStatus { .. } => "instance_bulk_status",
            Self::InstanceDeleted { .. } => "instance_deleted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_change_serializes_with_tag() {
        let event = LifecycleEvent::SubscriptionStatusChanged {
            subscription_id: SubscriptionId::new(),
            from: SubscriptionStatus::Pending,
            to: SubscriptionStatus::Paid,
            trigger: "payment",
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap_or_default();
        assert_eq!(
            json.get("event_type").cloned().unwrap_or_default(),
            "subscription_status_changed"
        );
        assert_eq!(json.get("from").cloned().unwrap_or_default(), "PENDING");
        assert_eq!(json.get("to").cloned().unwrap_or_default(), "PAID");
        assert_eq!(event.event_type_str(), "subscription_status_changed");
    }

    #[test]
    fn aggregate_id_follows_the_owning_entity() {
        let instance_id = InstanceId::new();
        let event = LifecycleEvent::InstanceDeleted {
            instance_id,
            subscription_id: SubscriptionId::new(),
            timestamp: Utc::now(),
        };
        assert_eq!(event.aggregate_id(), uuid::Uuid::from(instance_id));
    }
}
