//! Status reconciler: cross-checks subscriptions against instances.

use std::sync::Arc;

use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{Actor, Inconsistency, InstanceId, SubscriptionId, reconciliation};
use crate::error::PlatformError;
use crate::persistence::{LifecycleStore, SubscriptionFilter};

/// Answer to "does this subscription already have an instance?".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct InstanceExistence {
    /// `true` if a live instance references the subscription.
    pub exists: bool,
    /// The live instance, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<InstanceId>,
}

/// Read-only consistency checks. Nothing here repairs state.
#[derive(Debug, Clone)]
pub struct ReconcilerService {
    store: Arc<dyn LifecycleStore>,
}

impl ReconcilerService {
    /// Creates a new `ReconcilerService`.
    #[must_use]
    pub fn new(store: Arc<dyn LifecycleStore>) -> Self {
        Self { store }
    }

    /// Reports whether a live instance references the subscription.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::NotFound`] if the subscription is not
    /// visible to the actor.
    pub async fn has_existing_instance(
        &self,
        actor: &Actor,
        subscription_id: SubscriptionId,
    ) -> Result<InstanceExistence, PlatformError> {
        match self.store.get_subscription(subscription_id).await? {
            Some(sub) if actor.can_access(sub.user_id) => {}
            _ => return Err(PlatformError::not_found("subscription", subscription_id)),
        }
        let instance = self
            .store
            .find_instance_by_subscription(subscription_id)
            .await?;
        Ok(InstanceExistence {
            exists: instance.is_some(),
            instance_id: instance.map(|i| i.id),
        })
    }

    /// Lists every subscription/instance disagreement. Admin only.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Forbidden`] for non-admins.
    pub async fn find_inconsistencies(
        &self,
        actor: &Actor,
    ) -> Result<Vec<Inconsistency>, PlatformError> {
        actor.require_admin("run reconciliation")?;
        let subscriptions = self
            .store
            .list_subscriptions(SubscriptionFilter::default())
            .await?;
        let instances = self.store.list_instances(None).await?;
        let found = reconciliation::find_inconsistencies(&subscriptions, &instances);
        if !found.is_empty() {
            tracing::warn!(count = found.len(), "lifecycle inconsistencies detected");
        }
        Ok(found)
    }
}
