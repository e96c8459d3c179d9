//! Service layer: lifecycle orchestration.
//!
//! Each service owns one concern and talks to storage through
//! [`crate::persistence::LifecycleStore`]. Mutations emit
//! [`crate::domain::LifecycleEvent`]s through the shared
//! [`crate::domain::EventBus`].

pub mod health_service;
pub mod instance_service;
pub mod payment_service;
pub mod reconciler_service;
pub mod subscription_service;
pub mod sweeper;

pub use health_service::{HealthProbe, HealthReport, HealthService, HttpProbe};
pub use instance_service::{InstanceService, NewInstance, UpdateOutcome};
pub use payment_service::{
    CheckoutInput, CheckoutSession, PaymentService, ReturnHints, ReturnView, WebhookAck,
};
pub use reconciler_service::{InstanceExistence, ReconcilerService};
pub use subscription_service::{
    NewSubscription, PriceQuote, SubscriptionPatch, SubscriptionService,
};
pub use sweeper::spawn_sweeper;
