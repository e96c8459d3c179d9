//! Domain layer: lifecycle entities, transition tables, and the event system.
//!
//! This module contains the server-side domain model: subscriptions and
//! their status machine, provisioned instances with per-service status,
//! payments, the plan catalog, derived health and reconciliation views,
//! and the event bus that broadcasts every lifecycle mutation.

pub mod actor;
pub mod duration;
pub mod event_bus;
pub mod health;
pub mod ids;
pub mod instance;
pub mod lifecycle_event;
pub mod payment;
pub mod plan;
pub mod reconciliation;
pub mod subscription;

pub use actor::{Actor, Role};
pub use duration::{SubscriptionDuration, checkout_total, compute_end_date};
pub use event_bus::EventBus;
pub use health::{
    Discrepancy, DiscrepancyKind, HealthSnapshot, Observation, ProbeReport, ServiceHealth,
    UsageCounters,
};
pub use ids::{InstanceId, PaymentId, PlanId, SubscriptionId, UserId};
pub use instance::{BulkAction, InstancePatch, QosInstance, ServiceKind, ServiceStatus};
pub use lifecycle_event::LifecycleEvent;
pub use payment::{Payment, PaymentStatus, ProviderResult};
pub use plan::{PlanCatalog, ServicePlan};
pub use reconciliation::{Inconsistency, InconsistencyKind};
pub use subscription::{RestaurantInfo, Subscription, SubscriptionStatus};
