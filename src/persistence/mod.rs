//! Persistence layer: lifecycle storage and the audit event log.
//!
//! Services talk to storage through the [`LifecycleStore`] trait. Two
//! implementations exist: [`memory::MemoryStore`] for tests and
//! database-less runs, and [`postgres::PostgresStore`] backed by
//! `sqlx::PgPool`.
//!
//! # Concurrency contract
//!
//! Every `replace_*` method is a compare-and-swap: the write only lands
//! if the stored row still matches the expected status or revision, and
//! the method returns `false` otherwise. Instance insertion enforces the
//! one-live-instance-per-subscription invariant atomically and reports a
//! violation as [`PlatformError::DuplicateInstance`].

use std::fmt::Debug;

use async_trait::async_trait;

use crate::domain::{
    InstanceId, LifecycleEvent, Payment, PaymentStatus, PlanCatalog, QosInstance, ServicePlan,
    Subscription, SubscriptionId, SubscriptionStatus, UserId,
};
use crate::error::PlatformError;

pub mod event_log;
pub mod memory;
pub mod models;
pub mod postgres;

/// Optional filters for subscription listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriptionFilter {
    /// Only subscriptions owned by this user.
    pub user_id: Option<UserId>,
    /// Only subscriptions in this status.
    pub status: Option<SubscriptionStatus>,
}

impl SubscriptionFilter {
    /// Returns `true` if `sub` passes the filter.
    #[must_use]
    pub fn matches(&self, sub: &Subscription) -> bool {
        self.user_id.is_none_or(|u| sub.user_id == u)
            && self.status.is_none_or(|s| sub.status == s)
    }
}

/// Subscription storage. Soft-deleted rows are invisible to reads.
#[async_trait]
pub trait SubscriptionStore: Send + Sync + Debug {
    /// Stores a new subscription.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Persistence`] on storage failure.
    async fn insert_subscription(&self, sub: &Subscription) -> Result<(), PlatformError>;

    /// Loads a live subscription.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Persistence`] on storage failure.
    async fn get_subscription(
        &self,
        id: SubscriptionId,
    ) -> Result<Option<Subscription>, PlatformError>;

    /// Lists live subscriptions, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Persistence`] on storage failure.
    async fn list_subscriptions(
        &self,
        filter: SubscriptionFilter,
    ) -> Result<Vec<Subscription>, PlatformError>;

    /// Overwrites a live subscription if its stored status still equals
    /// `expected` and its stored revision still equals
    /// `expected_revision`. The caller bumps `sub.revision`. Returns
    /// `false` when the guard fails.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Persistence`] on storage failure.
    async fn replace_subscription(
        &self,
        sub: &Subscription,
        expected: SubscriptionStatus,
        expected_revision: u64,
    ) -> Result<bool, PlatformError>;
}

/// Instance storage. Soft-deleted rows are invisible to reads.
#[async_trait]
pub trait InstanceStore: Send + Sync + Debug {
    /// Stores a new instance.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::DuplicateInstance`] if a live instance
    /// already references the same subscription, or
    /// [`PlatformError::Persistence`] on storage failure.
    async fn insert_instance(&self, instance: &QosInstance) -> Result<(), PlatformError>;

    /// Loads a live instance.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Persistence`] on storage failure.
    async fn get_instance(&self, id: InstanceId) -> Result<Option<QosInstance>, PlatformError>;

    /// Loads the live instance of a subscription.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Persistence`] on storage failure.
    async fn find_instance_by_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Option<QosInstance>, PlatformError>;

    /// Lists live instances, newest first, optionally for one owner.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Persistence`] on storage failure.
    async fn list_instances(
        &self,
        user_id: Option<UserId>,
    ) -> Result<Vec<QosInstance>, PlatformError>;

    /// Overwrites a live instance if its stored revision still equals
    /// `expected_revision`. The caller bumps `instance.revision`.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Persistence`] on storage failure.
    async fn replace_instance(
        &self,
        instance: &QosInstance,
        expected_revision: u64,
    ) -> Result<bool, PlatformError>;
}

/// Payment attempt storage.
#[async_trait]
pub trait PaymentStore: Send + Sync + Debug {
    /// Stores a new payment attempt.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Persistence`] on storage failure or an
    /// order-code collision.
    async fn insert_payment(&self, payment: &Payment) -> Result<(), PlatformError>;

    /// Loads a payment by provider order code.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Persistence`] on storage failure.
    async fn get_payment_by_order_code(
        &self,
        order_code: i64,
    ) -> Result<Option<Payment>, PlatformError>;

    /// Loads the most recent payment for a subscription.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Persistence`] on storage failure.
    async fn latest_payment_for_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Option<Payment>, PlatformError>;

    /// Overwrites a payment if its stored status still equals `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Persistence`] on storage failure.
    async fn replace_payment(
        &self,
        payment: &Payment,
        expected: PaymentStatus,
    ) -> Result<bool, PlatformError>;
}

/// Plan catalog source and audit log sink.
#[async_trait]
pub trait CatalogStore: Send + Sync + Debug {
    /// Loads every stored plan, active or not.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Persistence`] on storage failure.
    async fn load_plans(&self) -> Result<Vec<ServicePlan>, PlatformError>;

    /// Inserts plans that do not exist yet. Existing rows are untouched.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Persistence`] on storage failure.
    async fn seed_plans(&self, plans: &[ServicePlan]) -> Result<(), PlatformError>;

    /// Appends an event to the audit log.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Persistence`] on storage failure.
    async fn save_event(&self, event: &LifecycleEvent) -> Result<(), PlatformError>;
}

/// Everything the services need from storage.
pub trait LifecycleStore: SubscriptionStore + InstanceStore + PaymentStore + CatalogStore {}

impl<T> LifecycleStore for T where T: SubscriptionStore + InstanceStore + PaymentStore + CatalogStore
{}

/// Loads the plan catalog, seeding the built-in plans into an empty store.
///
/// # Errors
///
/// Returns [`PlatformError::Persistence`] on storage failure.
pub async fn load_catalog(store: &dyn LifecycleStore) -> Result<PlanCatalog, PlatformError> {
    let plans = store.load_plans().await?;
    if !plans.is_empty() {
        tracing::info!(plans = plans.len(), "plan catalog loaded");
        return Ok(PlanCatalog::new(plans));
    }
    let builtin = PlanCatalog::builtin();
    store.seed_plans(&builtin.list(true)).await?;
    tracing::info!(plans = builtin.len(), "seeded built-in plan catalog");
    Ok(builtin)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::persistence::memory::MemoryStore;

    #[tokio::test]
    async fn empty_store_is_seeded_once() {
        let store = MemoryStore::new();
        let Ok(first) = load_catalog(&store).await else {
            panic!("first load");
        };
        let Ok(second) = load_catalog(&store).await else {
            panic!("second load");
        };
        assert!(!first.is_empty());
        assert_eq!(first.list(true), second.list(true));
    }
}
