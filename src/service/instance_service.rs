//! Instance provisioner: creation gate, partial updates, status control.

use std::sync::Arc;

use chrono::Utc;

use crate::domain::instance::{default_db_name, validate_db_name, validate_url};
use crate::domain::{
    Actor, BulkAction, EventBus, InstanceId, InstancePatch, LifecycleEvent, QosInstance,
    ServiceKind, ServiceStatus, SubscriptionId, SubscriptionStatus, UserId,
};
use crate::error::PlatformError;
use crate::persistence::LifecycleStore;

/// Input for [`InstanceService::create_instance`].
#[derive(Debug, Clone, Default)]
pub struct NewInstance {
    /// Subscription to provision for.
    pub subscription_id: SubscriptionId,
    /// Owner as claimed by the caller; must match the subscription.
    pub user_id: Option<UserId>,
    /// Tenant database name; derived from the subscription id if absent.
    pub db_name: Option<String>,
    /// Frontend URL.
    pub front_end_url: Option<String>,
    /// Backend URL.
    pub back_end_url: Option<String>,
    /// Application version.
    pub version: Option<String>,
    /// Initial database status; `INACTIVE` when absent.
    pub status_db: Option<ServiceStatus>,
    /// Initial frontend status.
    pub status_fe: Option<ServiceStatus>,
    /// Initial backend status.
    pub status_be: Option<ServiceStatus>,
}

/// Result of a partial update.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// At least one field changed; the stored entity.
    Updated(QosInstance),
    /// Every supplied field already matched; nothing was written.
    NothingToUpdate,
}

/// Orchestration layer for provisioned instances.
///
/// Writes are compare-and-swap on [`QosInstance::revision`]; a lost race
/// surfaces as [`PlatformError::StateConflict`].
#[derive(Debug, Clone)]
pub struct InstanceService {
    store: Arc<dyn LifecycleStore>,
    event_bus: EventBus,
}

impl InstanceService {
    /// Creates a new `InstanceService`.
    #[must_use]
    pub fn new(store: Arc<dyn LifecycleStore>, event_bus: EventBus) -> Self {
        Self { store, event_bus }
    }

    /// Provisions the single instance of a PAID subscription. Admin only.
    ///
    /// # Errors
    ///
    /// - [`PlatformError::Forbidden`] for non-admins.
    /// - [`PlatformError::NotEligible`] if the subscription is missing or
    ///   not PAID.
    /// - [`PlatformError::DuplicateInstance`] if a live instance exists.
    /// - [`PlatformError::Validation`] for malformed input.
    pub async fn create_instance(
        &self,
        actor: &Actor,
        input: NewInstance,
    ) -> Result<QosInstance, PlatformError> {
        actor.require_admin("provision instances")?;

        let Some(sub) = self.store.get_subscription(input.subscription_id).await? else {
            return Err(PlatformError::NotEligible("subscription not found".to_string()));
        };
        if sub.status != SubscriptionStatus::Paid {
            return Err(PlatformError::NotEligible(format!(
                "subscription not PAID (status is {})",
                sub.status
            )));
        }
        if let Some(claimed) = input.user_id
            && claimed != sub.user_id
        {
            return Err(PlatformError::Validation(format!(
                "user_id {claimed} does not own subscription {}",
                sub.id
            )));
        }

        validate_url("front_end_url", input.front_end_url.as_deref())?;
        validate_url("back_end_url", input.back_end_url.as_deref())?;
        let db_name = input
            .db_name
            .unwrap_or_else(|| default_db_name(sub.id));
        validate_db_name(&db_name)?;

        let now = Utc::now();
        let instance = QosInstance {
            id: InstanceId::new(),
            subscription_id: sub.id,
            user_id: sub.user_id,
            db_name: Some(db_name),
            front_end_url: input.front_end_url,
            back_end_url: input.back_end_url,
            status_db: input.status_db.unwrap_or(ServiceStatus::Inactive),
            status_fe: input.status_fe.unwrap_or(ServiceStatus::Inactive),
            status_be: input.status_be.unwrap_or(ServiceStatus::Inactive),
            response_time: None,
            uptime: None,
            db_size: None,
            version: input.version,
            deployed_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            revision: 0,
        };
        // Uniqueness is decided atomically by the store.
        self.store.insert_instance(&instance).await?;

        self.event_bus.publish(LifecycleEvent::InstanceCreated {
            instance_id: instance.id,
            subscription_id: instance.subscription_id,
            timestamp: now,
        });
        tracing::info!(
            instance_id = %instance.id,
            subscription_id = %instance.subscription_id,
            "instance provisioned"
        );
        Ok(instance)
    }

    /// Loads an instance the actor may see.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::NotFound`] if missing, deleted, or owned by
    /// someone else.
    pub async fn get_instance(
        &self,
        actor: &Actor,
        id: InstanceId,
    ) -> Result<QosInstance, PlatformError> {
        match self.store.get_instance(id).await? {
            Some(instance) if actor.can_access(instance.user_id) => Ok(instance),
            _ => Err(PlatformError::not_found("qos instance", id)),
        }
    }

    /// Lists instances: all for admins, own for users.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Persistence`] on storage failure.
    pub async fn list_instances(&self, actor: &Actor) -> Result<Vec<QosInstance>, PlatformError> {
        let owner = (!actor.is_admin()).then_some(actor.user_id);
        self.store.list_instances(owner).await
    }

    /// Returns the live instance of a subscription, if any.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::NotFound`] if the instance belongs to
    /// someone else.
    pub async fn get_instance_by_subscription(
        &self,
        actor: &Actor,
        subscription_id: SubscriptionId,
    ) -> Result<Option<QosInstance>, PlatformError> {
        match self
            .store
            .find_instance_by_subscription(subscription_id)
            .await?
        {
            Some(instance) if !actor.can_access(instance.user_id) => {
                Err(PlatformError::not_found("qos instance", subscription_id))
            }
            found => Ok(found),
        }
    }

    /// Applies only the fields that differ from the stored instance.
    ///
    /// Status fields set here are admin overrides and skip the
    /// per-service transition table.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Forbidden`], [`PlatformError::NotFound`],
    /// [`PlatformError::Validation`], or [`PlatformError::StateConflict`].
    pub async fn update_instance(
        &self,
        actor: &Actor,
        id: InstanceId,
        patch: &InstancePatch,
    ) -> Result<UpdateOutcome, PlatformError> {
        actor.require_admin("edit instances")?;
        patch.validate()?;
        let current = self.get_instance(actor, id).await?;

        let changes = patch.diff(&current);
        if changes.is_empty() {
            return Ok(UpdateOutcome::NothingToUpdate);
        }

        let mut next = current.clone();
        changes.apply_to(&mut next);
        let fields = changes.field_names();
        self.commit(&mut next, current.revision).await?;

        self.event_bus.publish(LifecycleEvent::InstanceUpdated {
            instance_id: id,
            subscription_id: next.subscription_id,
            fields,
            timestamp: next.updated_at,
        });
        Ok(UpdateOutcome::Updated(next))
    }

    /// Sets all three services to the action's target in one write.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Forbidden`], [`PlatformError::NotFound`],
    /// or [`PlatformError::StateConflict`].
    pub async fn apply_bulk_action(
        &self,
        actor: &Actor,
        id: InstanceId,
        action: BulkAction,
    ) -> Result<QosInstance, PlatformError> {
        actor.require_admin("change instance status")?;
        let current = self.get_instance(actor, id).await?;
        let target = action.target();

        let mut next = current.clone();
        next.set_all(target);
        if action == BulkAction::ActivateAll {
            next.deployed_at = Some(Utc::now());
        }
        self.commit(&mut next, current.revision).await?;

        self.event_bus.publish(LifecycleEvent::InstanceBulkStatus {
            instance_id: id,
            action,
            status: target,
            timestamp: next.updated_at,
        });
        tracing::info!(instance_id = %id, ?action, status = %target, "bulk status applied");
        Ok(next)
    }

    /// Moves one service along the per-service transition table.
    ///
    /// Requesting the current status again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::InvalidServiceTransition`] for a move the
    /// table does not allow, plus the usual access and conflict errors.
    pub async fn set_service_status(
        &self,
        actor: &Actor,
        id: InstanceId,
        service: ServiceKind,
        target: ServiceStatus,
    ) -> Result<QosInstance, PlatformError> {
        actor.require_admin("change instance status")?;
        let current = self.get_instance(actor, id).await?;
        let from = current.service_status(service);
        if from == target {
            return Ok(current);
        }
        if !from.can_transition_to(target) {
            return Err(PlatformError::InvalidServiceTransition {
                service: service.as_str(),
                from,
                to: target,
            });
        }

        let mut next = current.clone();
        next.set_service_status(service, target);
        self.commit(&mut next, current.revision).await?;

        self.event_bus.publish(LifecycleEvent::InstanceUpdated {
            instance_id: id,
            subscription_id: next.subscription_id,
            fields: vec![status_field(service)],
            timestamp: next.updated_at,
        });
        Ok(next)
    }

    /// Soft-deletes an instance. Admin only; the subscription is untouched.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Forbidden`], [`PlatformError::NotFound`],
    /// or [`PlatformError::StateConflict`].
    pub async fn delete_instance(
        &self,
        actor: &Actor,
        id: InstanceId,
    ) -> Result<QosInstance, PlatformError> {
        actor.require_admin("delete instances")?;
        let current = self.get_instance(actor, id).await?;
        let mut next = current.clone();
        next.deleted_at = Some(Utc::now());
        self.commit(&mut next, current.revision).await?;

        self.event_bus.publish(LifecycleEvent::InstanceDeleted {
            instance_id: id,
            subscription_id: next.subscription_id,
            timestamp: next.updated_at,
        });
        tracing::info!(instance_id = %id, "instance deleted");
        Ok(next)
    }

    /// Bumps the revision and writes `next` if nobody else did first.
    async fn commit(&self, next: &mut QosInstance, expected: u64) -> Result<(), PlatformError> {
        next.revision = expected.saturating_add(1);
        next.updated_at = Utc::now();
        if self.store.replace_instance(next, expected).await? {
            Ok(())
        } else {
            Err(PlatformError::StateConflict(format!(
                "instance {} changed concurrently",
                next.id
            )))
        }
    }
}

const fn status_field(service: ServiceKind) -> &'static str {
    match service {
        ServiceKind::Database => "status_db",
        ServiceKind::Frontend => "status_fe",
        ServiceKind::Backend => "status_be",
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{PlanId, RestaurantInfo, Subscription, SubscriptionDuration};
    use crate::persistence::SubscriptionStore;
    use crate::persistence::memory::MemoryStore;

    struct Fixture {
        service: InstanceService,
        store: Arc<MemoryStore>,
        admin: Actor,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        Fixture {
            service: InstanceService::new(
                Arc::clone(&store) as Arc<dyn LifecycleStore>,
                EventBus::new(64),
            ),
            store,
            admin: Actor::admin(UserId::new()),
        }
    }

    async fn subscription(fx: &Fixture, status: SubscriptionStatus) -> Subscription {
        let mut sub = Subscription::new(
            UserId::new(),
            PlanId::new(),
            RestaurantInfo {
                name: "Cuc Gach Quan".to_string(),
                address: "10 Dang Tat, District 1".to_string(),
                phone: "028 3848 0144".to_string(),
                restaurant_type: "vietnamese".to_string(),
                description: None,
            },
            SubscriptionDuration::OneMonth,
            Utc::now(),
        );
        sub.status = status;
        let Ok(()) = fx.store.insert_subscription(&sub).await else {
            panic!("seed subscription");
        };
        sub
    }

    fn request(sub: &Subscription) -> NewInstance {
        NewInstance {
            subscription_id: sub.id,
            front_end_url: Some("https://cucgach.qos.example.com".to_string()),
            back_end_url: Some("https://api.cucgach.qos.example.com".to_string()),
            ..NewInstance::default()
        }
    }

    async fn provisioned(fx: &Fixture) -> QosInstance {
        let sub = subscription(fx, SubscriptionStatus::Paid).await;
        let Ok(instance) = fx.service.create_instance(&fx.admin, request(&sub)).await else {
            panic!("create instance");
        };
        instance
    }

    #[tokio::test]
    async fn create_on_paid_subscription_starts_inactive() {
        let fx = fixture();
        let instance = provisioned(&fx).await;
        assert_eq!(instance.overall_status(), ServiceStatus::Inactive);
        assert!(
            instance
                .db_name
                .as_deref()
                .is_some_and(|n| n.starts_with("qos_"))
        );
    }

    #[tokio::test]
    async fn create_keeps_supplied_service_statuses() {
        let fx = fixture();
        let sub = subscription(&fx, SubscriptionStatus::Paid).await;
        let input = NewInstance {
            status_db: Some(ServiceStatus::Active),
            status_fe: Some(ServiceStatus::Deploying),
            ..request(&sub)
        };
        let Ok(instance) = fx.service.create_instance(&fx.admin, input).await else {
            panic!("create instance");
        };
        assert_eq!(instance.status_db, ServiceStatus::Active);
        assert_eq!(instance.status_fe, ServiceStatus::Deploying);
        assert_eq!(instance.status_be, ServiceStatus::Inactive);

        let Ok(stored) = fx.service.get_instance(&fx.admin, instance.id).await else {
            panic!("get instance");
        };
        assert_eq!(stored.status_fe, ServiceStatus::Deploying);
    }

    #[tokio::test]
    async fn create_on_pending_is_not_eligible_and_writes_nothing() {
        let fx = fixture();
        let sub = subscription(&fx, SubscriptionStatus::Pending).await;
        assert!(matches!(
            fx.service.create_instance(&fx.admin, request(&sub)).await,
            Err(PlatformError::NotEligible(_))
        ));
        let Ok(all) = fx.service.list_instances(&fx.admin).await else {
            panic!("list");
        };
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn create_on_missing_subscription_is_not_eligible() {
        let fx = fixture();
        let input = NewInstance {
            subscription_id: SubscriptionId::new(),
            ..NewInstance::default()
        };
        let Err(PlatformError::NotEligible(msg)) =
            fx.service.create_instance(&fx.admin, input).await
        else {
            panic!("expected NotEligible");
        };
        assert_eq!(msg, "subscription not found");
    }

    #[tokio::test]
    async fn mismatched_owner_is_rejected() {
        let fx = fixture();
        let sub = subscription(&fx, SubscriptionStatus::Paid).await;
        let mut input = request(&sub);
        input.user_id = Some(UserId::new());
        assert!(matches!(
            fx.service.create_instance(&fx.admin, input).await,
            Err(PlatformError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn second_create_reports_existing_instance() {
        let fx = fixture();
        let sub = subscription(&fx, SubscriptionStatus::Paid).await;
        let Ok(first) = fx.service.create_instance(&fx.admin, request(&sub)).await else {
            panic!("first create");
        };
        let Err(PlatformError::DuplicateInstance { existing, .. }) =
            fx.service.create_instance(&fx.admin, request(&sub)).await
        else {
            panic!("expected duplicate");
        };
        assert_eq!(existing.instance_id, first.id);
        assert_eq!(existing.front_end_url, first.front_end_url);
    }

    #[tokio::test]
    async fn concurrent_creates_yield_one_instance() {
        let fx = fixture();
        let sub = subscription(&fx, SubscriptionStatus::Paid).await;
        let service = Arc::new(fx.service.clone());

        let mut handles = Vec::new();
        for _ in 0..10 {
            let service = Arc::clone(&service);
            let admin = fx.admin;
            let input = request(&sub);
            handles.push(tokio::spawn(async move {
                service.create_instance(&admin, input).await
            }));
        }

        let (mut ok, mut duplicates) = (0, 0);
        for handle in handles {
            match handle.await {
                Ok(Ok(_)) => ok += 1,
                Ok(Err(PlatformError::DuplicateInstance { .. })) => duplicates += 1,
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(duplicates, 9);
    }

    #[tokio::test]
    async fn only_admins_provision() {
        let fx = fixture();
        let sub = subscription(&fx, SubscriptionStatus::Paid).await;
        let owner = Actor::user(sub.user_id);
        assert!(matches!(
            fx.service.create_instance(&owner, request(&sub)).await,
            Err(PlatformError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn identical_patch_is_nothing_to_update() {
        let fx = fixture();
        let instance = provisioned(&fx).await;
        let patch = InstancePatch {
            front_end_url: instance.front_end_url.clone(),
            status_db: Some(ServiceStatus::Inactive),
            ..InstancePatch::default()
        };
        assert!(matches!(
            fx.service
                .update_instance(&fx.admin, instance.id, &patch)
                .await,
            Ok(UpdateOutcome::NothingToUpdate)
        ));
    }

    #[tokio::test]
    async fn patch_applies_only_changed_fields() {
        let fx = fixture();
        let instance = provisioned(&fx).await;
        let patch = InstancePatch {
            version: Some("2.4.1".to_string()),
            front_end_url: instance.front_end_url.clone(),
            ..InstancePatch::default()
        };
        let Ok(UpdateOutcome::Updated(updated)) = fx
            .service
            .update_instance(&fx.admin, instance.id, &patch)
            .await
        else {
            panic!("expected update");
        };
        assert_eq!(updated.version.as_deref(), Some("2.4.1"));
        assert_eq!(updated.revision, instance.revision + 1);
    }

    #[tokio::test]
    async fn bulk_actions_align_all_services() {
        let fx = fixture();
        let instance = provisioned(&fx).await;
        for action in [
            BulkAction::DeployAll,
            BulkAction::ActivateAll,
            BulkAction::MaintenanceAll,
        ] {
            let Ok(after) = fx
                .service
                .apply_bulk_action(&fx.admin, instance.id, action)
                .await
            else {
                panic!("bulk action");
            };
            let target = action.target();
            assert_eq!(after.status_db, target);
            assert_eq!(after.status_fe, target);
            assert_eq!(after.status_be, target);
        }
    }

    #[tokio::test]
    async fn service_status_follows_the_table() {
        let fx = fixture();
        let instance = provisioned(&fx).await;

        let Err(PlatformError::InvalidServiceTransition { service, .. }) = fx
            .service
            .set_service_status(&fx.admin, instance.id, ServiceKind::Backend, ServiceStatus::Active)
            .await
        else {
            panic!("INACTIVE -> ACTIVE must be rejected");
        };
        assert_eq!(service, "backend");

        let Ok(deploying) = fx
            .service
            .set_service_status(
                &fx.admin,
                instance.id,
                ServiceKind::Backend,
                ServiceStatus::Deploying,
            )
            .await
        else {
            panic!("INACTIVE -> DEPLOYING is allowed");
        };
        assert_eq!(deploying.status_be, ServiceStatus::Deploying);
        assert_eq!(deploying.overall_status(), ServiceStatus::Deploying);

        let Ok(same) = fx
            .service
            .set_service_status(
                &fx.admin,
                instance.id,
                ServiceKind::Backend,
                ServiceStatus::Deploying,
            )
            .await
        else {
            panic!("same status is a no-op");
        };
        assert_eq!(same.revision, deploying.revision);
    }

    #[tokio::test]
    async fn stale_revision_is_a_conflict() {
        let fx = fixture();
        let instance = provisioned(&fx).await;
        let mut stale = instance.clone();
        let Ok(()) = fx.service.commit(&mut stale, instance.revision).await else {
            panic!("first write");
        };
        let mut again = instance.clone();
        assert!(matches!(
            fx.service.commit(&mut again, instance.revision).await,
            Err(PlatformError::StateConflict(_))
        ));
    }

    #[tokio::test]
    async fn delete_frees_the_subscription() {
        let fx = fixture();
        let instance = provisioned(&fx).await;
        let Ok(_) = fx.service.delete_instance(&fx.admin, instance.id).await else {
            panic!("delete");
        };
        assert!(matches!(
            fx.service.get_instance(&fx.admin, instance.id).await,
            Err(PlatformError::NotFound { .. })
        ));
        let input = NewInstance {
            subscription_id: instance.subscription_id,
            ..NewInstance::default()
        };
        assert!(fx.service.create_instance(&fx.admin, input).await.is_ok());
    }

    #[tokio::test]
    async fn owners_see_only_their_instances() {
        let fx = fixture();
        let instance = provisioned(&fx).await;
        let owner = Actor::user(instance.user_id);
        let stranger = Actor::user(UserId::new());

        assert!(fx.service.get_instance(&owner, instance.id).await.is_ok());
        assert!(fx.service.get_instance(&stranger, instance.id).await.is_err());
        let Ok(theirs) = fx.service.list_instances(&stranger).await else {
            panic!("list");
        };
        assert!(theirs.is_empty());
    }
}
