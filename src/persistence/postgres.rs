//! PostgreSQL implementation of the persistence layer.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use super::models::{InstanceRow, PaymentRow, PlanRow, SubscriptionRow, to_signed};
use super::{CatalogStore, InstanceStore, PaymentStore, SubscriptionFilter, SubscriptionStore};
use crate::domain::{
    InstanceId, LifecycleEvent, Payment, PaymentStatus, QosInstance, ServicePlan, Subscription,
    SubscriptionId, SubscriptionStatus, UserId,
};
use crate::error::PlatformError;

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, service_plan_id, restaurant_name, \
     restaurant_address, restaurant_phone, restaurant_type, description, duration, status, \
     start_date, end_date, created_at, updated_at, deleted_at, revision";

const INSTANCE_COLUMNS: &str = "id, subscription_id, user_id, db_name, front_end_url, \
     back_end_url, status_db, status_fe, status_be, response_time, uptime, db_size, version, \
     deployed_at, created_at, updated_at, deleted_at, revision";

const PAYMENT_COLUMNS: &str = "id, subscription_id, order_code, amount, status, \
     provider_reference, checkout_url, created_at, updated_at";

/// PostgreSQL-backed [`super::LifecycleStore`] using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Persistence`] if the database is unreachable.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        connect_timeout: Duration,
    ) -> Result<Self, PlatformError> {
        tracing::info!(max_connections, min_connections, "connecting to PostgreSQL");
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(connect_timeout)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Applies pending migrations from `migrations/`.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Persistence`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), PlatformError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| PlatformError::Persistence(format!("migration failed: {e}")))?;
        tracing::info!("database migrations applied");
        Ok(())
    }
}

/// Returns `true` for a unique-constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

#[async_trait]
impl SubscriptionStore for PostgresStore {
    async fn insert_subscription(&self, sub: &Subscription) -> Result<(), PlatformError> {
        sqlx::query(
            "INSERT INTO subscriptions (id, user_id, service_plan_id, restaurant_name, \
             restaurant_address, restaurant_phone, restaurant_type, description, duration, \
             status, start_date, end_date, created_at, updated_at, deleted_at, revision) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(Uuid::from(sub.id))
        .bind(Uuid::from(sub.user_id))
        .bind(Uuid::from(sub.service_plan_id))
        .bind(&sub.restaurant.name)
        .bind(&sub.restaurant.address)
        .bind(&sub.restaurant.phone)
        .bind(&sub.restaurant.restaurant_type)
        .bind(&sub.restaurant.description)
        .bind(sub.duration.as_str())
        .bind(sub.status.as_str())
        .bind(sub.start_date)
        .bind(sub.end_date)
        .bind(sub.created_at)
        .bind(sub.updated_at)
        .bind(sub.deleted_at)
        .bind(to_signed("revision", sub.revision)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_subscription(
        &self,
        id: SubscriptionId,
    ) -> Result<Option<Subscription>, PlatformError> {
        let sql = format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = $1 AND deleted_at IS NULL"
        );
        sqlx::query_as::<_, SubscriptionRow>(&sql)
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await?
            .map(Subscription::try_from)
            .transpose()
    }

    async fn list_subscriptions(
        &self,
        filter: SubscriptionFilter,
    ) -> Result<Vec<Subscription>, PlatformError> {
        let sql = format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions \
             WHERE deleted_at IS NULL \
             AND ($1::uuid IS NULL OR user_id = $1) \
             AND ($2::text IS NULL OR status = $2) \
             ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, SubscriptionRow>(&sql)
            .bind(filter.user_id.map(Uuid::from))
            .bind(filter.status.map(SubscriptionStatus::as_str))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Subscription::try_from)
            .collect()
    }

    async fn replace_subscription(
        &self,
        sub: &Subscription,
        expected: SubscriptionStatus,
        expected_revision: u64,
    ) -> Result<bool, PlatformError> {
        let result = sqlx::query(
            "UPDATE subscriptions SET restaurant_name = $4, restaurant_address = $5, \
             restaurant_phone = $6, restaurant_type = $7, description = $8, duration = $9, \
             status = $10, start_date = $11, end_date = $12, updated_at = $13, deleted_at = $14, \
             revision = $15 \
             WHERE id = $1 AND status = $2 AND revision = $3 AND deleted_at IS NULL",
        )
        .bind(Uuid::from(sub.id))
        .bind(expected.as_str())
        .bind(to_signed("revision", expected_revision)?)
        .bind(&sub.restaurant.name)
        .bind(&sub.restaurant.address)
        .bind(&sub.restaurant.phone)
        .bind(&sub.restaurant.restaurant_type)
        .bind(&sub.restaurant.description)
        .bind(sub.duration.as_str())
        .bind(sub.status.as_str())
        .bind(sub.start_date)
        .bind(sub.end_date)
        .bind(sub.updated_at)
        .bind(sub.deleted_at)
        .bind(to_signed("revision", sub.revision)?)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl InstanceStore for PostgresStore {
    async fn insert_instance(&self, instance: &QosInstance) -> Result<(), PlatformError> {
        let inserted = sqlx::query(
            "INSERT INTO qos_instances (id, subscription_id, user_id, db_name, front_end_url, \
             back_end_url, status_db, status_fe, status_be, response_time, uptime, db_size, \
             version, deployed_at, created_at, updated_at, deleted_at, revision) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)",
        )
        .bind(Uuid::from(instance.id))
        .bind(Uuid::from(instance.subscription_id))
        .bind(Uuid::from(instance.user_id))
        .bind(&instance.db_name)
        .bind(&instance.front_end_url)
        .bind(&instance.back_end_url)
        .bind(instance.status_db.as_str())
        .bind(instance.status_fe.as_str())
        .bind(instance.status_be.as_str())
        .bind(response_time(instance)?)
        .bind(instance.uptime)
        .bind(instance.db_size.map(|v| to_signed("db_size", v)).transpose()?)
        .bind(&instance.version)
        .bind(instance.deployed_at)
        .bind(instance.created_at)
        .bind(instance.updated_at)
        .bind(instance.deleted_at)
        .bind(to_signed("revision", instance.revision)?)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => {
                let existing = self
                    .find_instance_by_subscription(instance.subscription_id)
                    .await?
                    .ok_or_else(|| {
                        PlatformError::StateConflict(format!(
                            "instance for subscription {} changed concurrently",
                            instance.subscription_id
                        ))
                    })?;
                Err(PlatformError::DuplicateInstance {
                    subscription_id: instance.subscription_id.into(),
                    existing: existing.as_existing(),
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn get_instance(&self, id: InstanceId) -> Result<Option<QosInstance>, PlatformError> {
        let sql = format!(
            "SELECT {INSTANCE_COLUMNS} FROM qos_instances WHERE id = $1 AND deleted_at IS NULL"
        );
        sqlx::query_as::<_, InstanceRow>(&sql)
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await?
            .map(QosInstance::try_from)
            .transpose()
    }

    async fn find_instance_by_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Option<QosInstance>, PlatformError> {
        let sql = format!(
            "SELECT {INSTANCE_COLUMNS} FROM qos_instances \
             WHERE subscription_id = $1 AND deleted_at IS NULL"
        );
        sqlx::query_as::<_, InstanceRow>(&sql)
            .bind(Uuid::from(subscription_id))
            .fetch_optional(&self.pool)
            .await?
            .map(QosInstance::try_from)
            .transpose()
    }

    async fn list_instances(
        &self,
        user_id: Option<UserId>,
    ) -> Result<Vec<QosInstance>, PlatformError> {
        let sql = format!(
            "SELECT {INSTANCE_COLUMNS} FROM qos_instances \
             WHERE deleted_at IS NULL AND ($1::uuid IS NULL OR user_id = $1) \
             ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, InstanceRow>(&sql)
            .bind(user_id.map(Uuid::from))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(QosInstance::try_from)
            .collect()
    }

    async fn replace_instance(
        &self,
        instance: &QosInstance,
        expected_revision: u64,
    ) -> Result<bool, PlatformError> {
        let result = sqlx::query(
            "UPDATE qos_instances SET db_name = $3, front_end_url = $4, back_end_url = $5, \
             status_db = $6, status_fe = $7, status_be = $8, response_time = $9, uptime = $10, \
             db_size = $11, version = $12, deployed_at = $13, updated_at = $14, \
             deleted_at = $15, revision = $16 \
             WHERE id = $1 AND revision = $2 AND deleted_at IS NULL",
        )
        .bind(Uuid::from(instance.id))
        .bind(to_signed("revision", expected_revision)?)
        .bind(&instance.db_name)
        .bind(&instance.front_end_url)
        .bind(&instance.back_end_url)
        .bind(instance.status_db.as_str())
        .bind(instance.status_fe.as_str())
        .bind(instance.status_be.as_str())
        .bind(response_time(instance)?)
        .bind(instance.uptime)
        .bind(instance.db_size.map(|v| to_signed("db_size", v)).transpose()?)
        .bind(&instance.version)
        .bind(instance.deployed_at)
        .bind(instance.updated_at)
        .bind(instance.deleted_at)
        .bind(to_signed("revision", instance.revision)?)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

fn response_time(instance: &QosInstance) -> Result<Option<i32>, PlatformError> {
    instance
        .response_time
        .map(|v| {
            i32::try_from(v)
                .map_err(|_| PlatformError::Validation(format!("response_time is too large: {v}")))
        })
        .transpose()
}

#[async_trait]
impl PaymentStore for PostgresStore {
    async fn insert_payment(&self, payment: &Payment) -> Result<(), PlatformError> {
        sqlx::query(
            "INSERT INTO payments (id, subscription_id, order_code, amount, status, \
             provider_reference, checkout_url, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(Uuid::from(payment.id))
        .bind(Uuid::from(payment.subscription_id))
        .bind(payment.order_code)
        .bind(to_signed("amount", payment.amount)?)
        .bind(payment.status.as_str())
        .bind(&payment.provider_reference)
        .bind(&payment.checkout_url)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_payment_by_order_code(
        &self,
        order_code: i64,
    ) -> Result<Option<Payment>, PlatformError> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_code = $1");
        sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(order_code)
            .fetch_optional(&self.pool)
            .await?
            .map(Payment::try_from)
            .transpose()
    }

    async fn latest_payment_for_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Option<Payment>, PlatformError> {
        let sql = format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE subscription_id = $1 \
             ORDER BY created_at DESC LIMIT 1"
        );
        sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(Uuid::from(subscription_id))
            .fetch_optional(&self.pool)
            .await?
            .map(Payment::try_from)
            .transpose()
    }

    async fn replace_payment(
        &self,
        payment: &Payment,
        expected: PaymentStatus,
    ) -> Result<bool, PlatformError> {
        let result = sqlx::query(
            "UPDATE payments SET status = $3, provider_reference = $4, checkout_url = $5, \
             updated_at = $6 WHERE id = $1 AND status = $2",
        )
        .bind(Uuid::from(payment.id))
        .bind(expected.as_str())
        .bind(payment.status.as_str())
        .bind(&payment.provider_reference)
        .bind(&payment.checkout_url)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl CatalogStore for PostgresStore {
    async fn load_plans(&self) -> Result<Vec<ServicePlan>, PlatformError> {
        sqlx::query_as::<_, PlanRow>(
            "SELECT id, name, price, description, active FROM service_plans ORDER BY price",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(ServicePlan::try_from)
        .collect()
    }

    async fn seed_plans(&self, plans: &[ServicePlan]) -> Result<(), PlatformError> {
        let mut tx = self.pool.begin().await?;
        for plan in plans {
            sqlx::query(
                "INSERT INTO service_plans (id, name, price, description, active) \
                 VALUES ($1, $2, $3, $4, $5) ON CONFLICT (id) DO NOTHING",
            )
            .bind(Uuid::from(plan.id))
            .bind(&plan.name)
            .bind(to_signed("price", plan.price)?)
            .bind(&plan.description)
            .bind(plan.active)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn save_event(&self, event: &LifecycleEvent) -> Result<(), PlatformError> {
        let payload = serde_json::to_value(event)
            .map_err(|e| PlatformError::Internal(format!("event serialization failed: {e}")))?;
        sqlx::query(
            "INSERT INTO lifecycle_events (aggregate_id, event_type, payload) VALUES ($1, $2, $3)",
        )
        .bind(event.aggregate_id())
        .bind(event.event_type_str())
        .bind(payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::{PlanId, RestaurantInfo, ServiceStatus, SubscriptionDuration};

    async fn store_from_env(test: &str) -> Option<PostgresStore> {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            eprintln!("skipping {test}: DATABASE_URL not set");
            return None;
        };
        let Ok(store) = PostgresStore::connect(&url, 12, 1, Duration::from_secs(5)).await else {
            panic!("connect to {url}");
        };
        let Ok(()) = store.migrate().await else {
            panic!("migrate");
        };
        Some(store)
    }

    async fn paid_subscription(store: &PostgresStore) -> Subscription {
        let plan = ServicePlan {
            id: PlanId::new(),
            name: "Standard".to_string(),
            price: 299_000,
            description: "Ordering for one restaurant".to_string(),
            active: true,
        };
        let Ok(()) = store.seed_plans(std::slice::from_ref(&plan)).await else {
            panic!("seed plan");
        };
        let mut sub = Subscription::new(
            UserId::new(),
            plan.id,
            RestaurantInfo {
                name: "Quan Bui".to_string(),
                address: "17A Ngo Van Nam, District 1".to_string(),
                phone: "028 3829 1515".to_string(),
                restaurant_type: "vietnamese".to_string(),
                description: None,
            },
            SubscriptionDuration::OneMonth,
            Utc::now(),
        );
        sub.status = SubscriptionStatus::Paid;
        let Ok(()) = store.insert_subscription(&sub).await else {
            panic!("seed subscription");
        };
        sub
    }

    fn instance_for(sub: &Subscription) -> QosInstance {
        let now = Utc::now();
        QosInstance {
            id: InstanceId::new(),
            subscription_id: sub.id,
            user_id: sub.user_id,
            db_name: Some(format!("qos_{}", sub.id.to_string().replace('-', ""))),
            front_end_url: Some("https://quanbui.qos.example.com".to_string()),
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
    #[ignore = "requires DATABASE_URL pointing at a disposable PostgreSQL"]
    async fn concurrent_inserts_map_unique_violation_to_duplicate_instance() {
        let Some(store) = store_from_env("concurrent_inserts_map_unique_violation").await else {
            return;
        };
        let sub = paid_subscription(&store).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let instance = instance_for(&sub);
            handles.push(tokio::spawn(async move {
                store.insert_instance(&instance).await.map(|()| instance.id)
            }));
        }

        let mut winners = Vec::new();
        let mut reported = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(Ok(id)) => winners.push(id),
                Ok(Err(PlatformError::DuplicateInstance { existing, .. })) => {
                    reported.push(existing.instance_id);
                }
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        let [winner] = winners.as_slice() else {
            panic!("expected exactly one insert to win, got {winners:?}");
        };
        assert_eq!(reported.len(), 7);
        assert!(reported.iter().all(|id| id == winner));
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL pointing at a disposable PostgreSQL"]
    async fn stale_subscription_revision_is_rejected() {
        let Some(store) = store_from_env("stale_subscription_revision_is_rejected").await else {
            return;
        };
        let sub = paid_subscription(&store).await;

        let mut first = sub.clone();
        first.restaurant.name = "Quan Bui Garden".to_string();
        first.revision = 1;
        let Ok(true) = store.replace_subscription(&first, sub.status, 0).await else {
            panic!("first edit should apply");
        };

        let mut stale = sub.clone();
        stale.restaurant.phone = "028 0000 0000".to_string();
        stale.revision = 1;
        let Ok(false) = store.replace_subscription(&stale, sub.status, 0).await else {
            panic!("edit from a stale read should be rejected");
        };

        let Ok(Some(stored)) = store.get_subscription(sub.id).await else {
            panic!("reload");
        };
        assert_eq!(stored.restaurant.name, "Quan Bui Garden");
        assert_eq!(stored.revision, 1);
    }
}
