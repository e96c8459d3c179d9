//! In-process storage used when no database is configured.
//!
//! [`MemoryStore`] keeps every table in one `HashMap` per entity behind a
//! single [`tokio::sync::RwLock`]. Each operation takes the lock once, so
//! check-then-write sequences (instance uniqueness, compare-and-swap
//! replacements) are atomic with respect to each other.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CatalogStore, InstanceStore, PaymentStore, SubscriptionFilter, SubscriptionStore};
use crate::domain::{
    InstanceId, LifecycleEvent, Payment, PaymentId, PaymentStatus, PlanId, QosInstance,
    ServicePlan, Subscription, SubscriptionId, SubscriptionStatus, UserId,
};
use crate::error::PlatformError;

#[derive(Debug, Default)]
struct Tables {
    subscriptions: HashMap<SubscriptionId, Subscription>,
    instances: HashMap<InstanceId, QosInstance>,
    payments: HashMap<PaymentId, Payment>,
    plans: HashMap<PlanId, ServicePlan>,
    events: Vec<LifecycleEvent>,
}

/// Volatile [`super::LifecycleStore`] implementation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the audit log.
    pub async fn events(&self) -> Vec<LifecycleEvent> {
        self.tables.read().await.events.clone()
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn insert_subscription(&self, sub: &Subscription) -> Result<(), PlatformError> {
        let mut tables = self.tables.write().await;
        if tables.subscriptions.contains_key(&sub.id) {
            return Err(PlatformError::Persistence(format!(
                "subscription {} already exists",
                sub.id
            )));
        }
        tables.subscriptions.insert(sub.id, sub.clone());
        Ok(())
    }

    async fn get_subscription(
        &self,
        id: SubscriptionId,
    ) -> Result<Option<Subscription>, PlatformError> {
        let tables = self.tables.read().await;
        Ok(tables
            .subscriptions
            .get(&id)
            .filter(|s| !s.is_deleted())
            .cloned())
    }

    async fn list_subscriptions(
        &self,
        filter: SubscriptionFilter,
    ) -> Result<Vec<Subscription>, PlatformError> {
        let tables = self.tables.read().await;
        let mut subs: Vec<Subscription> = tables
            .subscriptions
            .values()
            .filter(|s| !s.is_deleted() && filter.matches(s))
            .cloned()
            .collect();
        subs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(subs)
    }

    async fn replace_subscription(
        &self,
        sub: &Subscription,
        expected: SubscriptionStatus,
        expected_revision: u64,
    ) -> Result<bool, PlatformError> {
        let mut tables = self.tables.write().await;
        match tables.subscriptions.get_mut(&sub.id) {
            Some(stored)
                if !stored.is_deleted()
                    && stored.status == expected
                    && stored.revision == expected_revision =>
            {
                *stored = sub.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl InstanceStore for MemoryStore {
    async fn insert_instance(&self, instance: &QosInstance) -> Result<(), PlatformError> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables
            .instances
            .values()
            .find(|i| !i.is_deleted() && i.subscription_id == instance.subscription_id)
        {
            return Err(PlatformError::DuplicateInstance {
                subscription_id: instance.subscription_id.into(),
                existing: existing.as_existing(),
            });
        }
        tables.instances.insert(instance.id, instance.clone());
        Ok(())
    }

    async fn get_instance(&self, id: InstanceId) -> Result<Option<QosInstance>, PlatformError> {
        let tables = self.tables.read().await;
        Ok(tables
            .instances
            .get(&id)
            .filter(|i| !i.is_deleted())
            .cloned())
    }

    async fn find_instance_by_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Option<QosInstance>, PlatformError> {
        let tables = self.tables.read().await;
        Ok(tables
            .instances
            .values()
            .find(|i| !i.is_deleted() && i.subscription_id == subscription_id)
            .cloned())
    }

    async fn list_instances(
        &self,
        user_id: Option<UserId>,
    ) -> Result<Vec<QosInstance>, PlatformError> {
        let tables = self.tables.read().await;
        let mut instances: Vec<QosInstance> = tables
            .instances
            .values()
            .filter(|i| !i.is_deleted() && user_id.is_none_or(|u| i.user_id == u))
            .cloned()
            .collect();
        instances.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(instances)
    }

    async fn replace_instance(
        &self,
        instance: &QosInstance,
        expected_revision: u64,
    ) -> Result<bool, PlatformError> {
        let mut tables = self.tables.write().await;
        match tables.instances.get_mut(&instance.id) {
            Some(stored) if !stored.is_deleted() && stored.revision == expected_revision => {
                *stored = instance.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn insert_payment(&self, payment: &Payment) -> Result<(), PlatformError> {
        let mut tables = self.tables.write().await;
        if tables
            .payments
            .values()
            .any(|p| p.order_code == payment.order_code)
        {
            return Err(PlatformError::Persistence(format!(
                "order code {} already used",
                payment.order_code
            )));
        }
        tables.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn get_payment_by_order_code(
        &self,
        order_code: i64,
    ) -> Result<Option<Payment>, PlatformError> {
        let tables = self.tables.read().await;
        Ok(tables
            .payments
            .values()
            .find(|p| p.order_code == order_code)
            .cloned())
    }

    async fn latest_payment_for_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Option<Payment>, PlatformError> {
        let tables = self.tables.read().await;
        Ok(tables
            .payments
            .values()
            .filter(|p| p.subscription_id == subscription_id)
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn replace_payment(
        &self,
        payment: &Payment,
        expected: PaymentStatus,
    ) -> Result<bool, PlatformError> {
        let mut tables = self.tables.write().await;
        match tables.payments.get_mut(&payment.id) {
            Some(stored) if stored.status == expected => {
                *stored = payment.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn load_plans(&self) -> Result<Vec<ServicePlan>, PlatformError> {
        Ok(self.tables.read().await.plans.values().cloned().collect())
    }

    async fn seed_plans(&self, plans: &[ServicePlan]) -> Result<(), PlatformError> {
        let mut tables = self.tables.write().await;
        for plan in plans {
            tables.plans.entry(plan.id).or_insert_with(|| plan.clone());
        }
        Ok(())
    }

    async fn save_event(&self, event: &LifecycleEvent) -> Result<(), PlatformError> {
        self.tables.write().await.events.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::*;
    use crate::domain::{RestaurantInfo, ServiceStatus, SubscriptionDuration};

    fn subscription() -> Subscription {
        Subscription::new(
            UserId::new(),
            PlanId::new(),
            RestaurantInfo {
                name: "Com Tam Ba Ghien".to_string(),
                address: "84 Dang Van Ngu, Phu Nhuan".to_string(),
                phone: "028 3846 1073".to_string(),
                restaurant_type: "rice".to_string(),
                description: None,
            },
            SubscriptionDuration::OneMonth,
            Utc::now(),
        )
    }

    fn instance_for(sub: &Subscription) -> QosInstance {
        let now = Utc::now();
        QosInstance {
            id: InstanceId::new(),
            subscription_id: sub.id,
            user_id: sub.user_id,
            db_name: Some("qos_comtam".to_string()),
            front_end_url: None,
            back_end_url: None,
            status_db: ServiceStatus::Inactive,
            status_fe: ServiceStatus::Inactive,
            status_be: ServiceStatus::Inactive,
            response_time: None,
            uptime: None,
            db_size: None,
            version: None,
            deployed_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            revision: 0,
        }
    }

    #[tokio::test]
    async fn replace_subscription_is_guarded_on_status() {
        let store = MemoryStore::new();
        let mut sub = subscription();
        let Ok(()) = store.insert_subscription(&sub).await else {
            panic!("insert");
        };

        sub.status = SubscriptionStatus::Paid;
        sub.revision = 1;
        assert!(matches!(
            store
                .replace_subscription(&sub, SubscriptionStatus::Pending, 0)
                .await,
            Ok(true)
        ));
        // Second writer still believes the row is PENDING.
        sub.status = SubscriptionStatus::Cancelled;
        assert!(matches!(
            store
                .replace_subscription(&sub, SubscriptionStatus::Pending, 1)
                .await,
            Ok(false)
        ));
    }

    #[tokio::test]
    async fn replace_subscription_is_guarded_on_revision() {
        let store = MemoryStore::new();
        let mut sub = subscription();
        let Ok(()) = store.insert_subscription(&sub).await else {
            panic!("insert");
        };

        let mut first = sub.clone();
        first.restaurant.name = "Pho Hoa Pasteur".to_string();
        first.revision = 1;
        assert!(matches!(
            store
                .replace_subscription(&first, SubscriptionStatus::Pending, 0)
                .await,
            Ok(true)
        ));

        // Same status, but read before the first edit landed.
        sub.restaurant.phone = "028 3829 7943".to_string();
        sub.revision = 1;
        assert!(matches!(
            store
                .replace_subscription(&sub, SubscriptionStatus::Pending, 0)
                .await,
            Ok(false)
        ));
        let Ok(Some(stored)) = store.get_subscription(sub.id).await else {
            panic!("get");
        };
        assert_eq!(stored.restaurant.name, "Pho Hoa Pasteur");
        assert_eq!(stored.revision, 1);
    }

    #[tokio::test]
    async fn soft_deleted_subscription_is_invisible() {
        let store = MemoryStore::new();
        let mut sub = subscription();
        let Ok(()) = store.insert_subscription(&sub).await else {
            panic!("insert");
        };
        sub.deleted_at = Some(Utc::now());
        sub.revision = 1;
        let Ok(true) = store.replace_subscription(&sub, sub.status, 0).await else {
            panic!("soft delete");
        };
        assert!(matches!(store.get_subscription(sub.id).await, Ok(None)));
        let Ok(all) = store.list_subscriptions(SubscriptionFilter::default()).await else {
            panic!("list");
        };
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn second_live_instance_is_rejected() {
        let store = MemoryStore::new();
        let sub = subscription();
        let first = instance_for(&sub);
        let Ok(()) = store.insert_instance(&first).await else {
            panic!("first insert");
        };

        let Err(PlatformError::DuplicateInstance { existing, .. }) =
            store.insert_instance(&instance_for(&sub)).await
        else {
            panic!("expected duplicate");
        };
        assert_eq!(existing.instance_id, first.id);
        assert_eq!(existing.db_name.as_deref(), Some("qos_comtam"));
    }

    #[tokio::test]
    async fn deleted_instance_frees_the_subscription() {
        let store = MemoryStore::new();
        let sub = subscription();
        let mut first = instance_for(&sub);
        let Ok(()) = store.insert_instance(&first).await else {
            panic!("insert");
        };
        first.deleted_at = Some(Utc::now());
        first.revision = 1;
        let Ok(true) = store.replace_instance(&first, 0).await else {
            panic!("soft delete");
        };
        assert!(store.insert_instance(&instance_for(&sub)).await.is_ok());
    }

    #[tokio::test]
    async fn concurrent_inserts_admit_exactly_one() {
        let store = Arc::new(MemoryStore::new());
        let sub = subscription();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            let instance = instance_for(&sub);
            handles.push(tokio::spawn(async move {
                store.insert_instance(&instance).await.is_ok()
            }));
        }
        let mut successes = 0;
        for handle in handles {
            if matches!(handle.await, Ok(true)) {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn latest_payment_wins() {
        let store = MemoryStore::new();
        let sub_id = SubscriptionId::new();
        let older = Payment::new(sub_id, 199_000, Utc::now() - chrono::Duration::minutes(5));
        let newer = Payment::new(sub_id, 199_000, Utc::now());
        for p in [&older, &newer] {
            let Ok(()) = store.insert_payment(p).await else {
                panic!("insert payment");
            };
        }
        let Ok(Some(latest)) = store.latest_payment_for_subscription(sub_id).await else {
            panic!("expected a payment");
        };
        assert_eq!(latest.id, newer.id);
    }
}
