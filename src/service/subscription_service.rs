//! Subscription manager: status machine, payment confirmation, sweeps.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::{
    Actor, EventBus, LifecycleEvent, PlanCatalog, PlanId, ProviderResult, RestaurantInfo,
    ServicePlan, Subscription, SubscriptionDuration, SubscriptionId, SubscriptionStatus,
    checkout_total,
};
use crate::error::PlatformError;
use crate::persistence::{LifecycleStore, SubscriptionFilter};

/// Input for [`SubscriptionService::create_subscription`].
#[derive(Debug, Clone)]
pub struct NewSubscription {
    /// Plan being purchased.
    pub plan_id: PlanId,
    /// Restaurant metadata.
    pub restaurant: RestaurantInfo,
    /// Purchased length.
    pub duration: SubscriptionDuration,
}

/// Admin edit of a subscription. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionPatch {
    /// New status, validated against the transition table.
    pub status: Option<SubscriptionStatus>,
    /// New period start; re-derives `end_date` unless `end_date` is set too.
    pub start_date: Option<DateTime<Utc>>,
    /// Explicit period end.
    pub end_date: Option<DateTime<Utc>>,
    /// New restaurant name.
    pub restaurant_name: Option<String>,
    /// New restaurant address.
    pub restaurant_address: Option<String>,
    /// New restaurant phone.
    pub restaurant_phone: Option<String>,
    /// New restaurant type.
    pub restaurant_type: Option<String>,
    /// New description.
    pub description: Option<String>,
}

/// Price preview for a plan and duration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceQuote {
    /// The plan quoted.
    pub plan: ServicePlan,
    /// Requested duration.
    pub duration: SubscriptionDuration,
    /// Number of months billed.
    pub months: u32,
    /// Total for the whole duration.
    pub total: u64,
}

/// Orchestration layer for subscriptions.
///
/// Every mutation follows the same pattern: load the row, apply the change
/// on a copy through the domain transition rules, compare-and-swap it back
/// guarded on the status that was read, emit an event, and return the
/// stored entity.
#[derive(Debug, Clone)]
pub struct SubscriptionService {
    store: Arc<dyn LifecycleStore>,
    catalog: Arc<PlanCatalog>,
    event_bus: EventBus,
    pending_ttl: Option<chrono::Duration>,
}

impl SubscriptionService {
    /// Creates a new `SubscriptionService`.
    ///
    /// `pending_ttl` enables [`Self::cancel_stale_pending`]; `None` keeps
    /// PENDING subscriptions forever.
    #[must_use]
    pub fn new(
        store: Arc<dyn LifecycleStore>,
        catalog: Arc<PlanCatalog>,
        event_bus: EventBus,
        pending_ttl: Option<chrono::Duration>,
    ) -> Self {
        Self {
            store,
            catalog,
            event_bus,
            pending_ttl,
        }
    }

    /// Returns the plan catalog.
    #[must_use]
    pub fn catalog(&self) -> &PlanCatalog {
        &self.catalog
    }

    /// Prices a plan for a duration.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::NotFound`] for an unknown plan or a
    /// validation error if the total overflows.
    pub fn quote(
        &self,
        plan_id: PlanId,
        duration: SubscriptionDuration,
    ) -> Result<PriceQuote, PlatformError> {
        let plan = self.catalog.get(plan_id)?;
        Ok(PriceQuote {
            plan: plan.clone(),
            duration,
            months: duration.months(),
            total: checkout_total(plan.price, duration)?,
        })
    }

    /// Creates a PENDING subscription owned by `actor`.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Validation`] for blank restaurant fields or
    /// an unknown or inactive plan.
    pub async fn create_subscription(
        &self,
        actor: &Actor,
        input: NewSubscription,
    ) -> Result<Subscription, PlatformError> {
        self.catalog.purchasable(input.plan_id)?;
        let restaurant = input.restaurant.normalized()?;

        let now = Utc::now();
        let sub = Subscription::new(actor.user_id, input.plan_id, restaurant, input.duration, now);
        self.store.insert_subscription(&sub).await?;

        self.event_bus.publish(LifecycleEvent::SubscriptionCreated {
            subscription_id: sub.id,
            user_id: sub.user_id,
            plan_id: sub.service_plan_id,
            timestamp: now,
        });
        tracing::info!(subscription_id = %sub.id, user_id = %sub.user_id, "subscription created");
        Ok(sub)
    }

    /// Loads a subscription the actor may see.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::NotFound`] if the row is missing, deleted,
    /// or owned by someone else.
    pub async fn get_subscription(
        &self,
        actor: &Actor,
        id: SubscriptionId,
    ) -> Result<Subscription, PlatformError> {
        match self.store.get_subscription(id).await? {
            Some(sub) if actor.can_access(sub.user_id) => Ok(sub),
            _ => Err(PlatformError::not_found("subscription", id)),
        }
    }

    /// Lists subscriptions: everything for admins, own rows for users.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Persistence`] on storage failure.
    pub async fn list_subscriptions(
        &self,
        actor: &Actor,
        status: Option<SubscriptionStatus>,
    ) -> Result<Vec<Subscription>, PlatformError> {
        let filter = SubscriptionFilter {
            user_id: (!actor.is_admin()).then_some(actor.user_id),
            status,
        };
        self.store.list_subscriptions(filter).await
    }

    /// Applies a verified provider result.
    ///
    /// Success moves PENDING to PAID. A repeated success on a PAID
    /// subscription is a no-op. A failure leaves the subscription as is.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::StateConflict`] if the subscription is in
    /// any other status, or [`PlatformError::NotFound`] if it is missing.
    pub async fn confirm_payment(
        &self,
        id: SubscriptionId,
        result: &ProviderResult,
    ) -> Result<Subscription, PlatformError> {
        let sub = self
            .store
            .get_subscription(id)
            .await?
            .ok_or_else(|| PlatformError::not_found("subscription", id))?;

        if let ProviderResult::Failure { reason } = result {
            tracing::info!(subscription_id = %id, reason = %reason, "payment failed, subscription unchanged");
            return Ok(sub);
        }

        match sub.status {
            SubscriptionStatus::Paid => Ok(sub),
            SubscriptionStatus::Pending => {
                let mut next = sub;
                next.transition(SubscriptionStatus::Paid, Utc::now())?;
                let committed = self
                    .commit(&mut next, SubscriptionStatus::Pending, "payment")
                    .await;
                match committed {
                    Ok(()) => Ok(next),
                    // A concurrent duplicate webhook may have won the race.
                    Err(PlatformError::StateConflict(_)) => {
                        match self.store.get_subscription(id).await? {
                            Some(current) if current.status == SubscriptionStatus::Paid => {
                                Ok(current)
                            }
                            _ => Err(conflict(id)),
                        }
                    }
                    Err(e) => Err(e),
                }
            }
            other => Err(PlatformError::StateConflict(format!(
                "subscription {id} is {other}, cannot confirm payment"
            ))),
        }
    }

    /// Admin status override validated against the transition table.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Forbidden`] for non-admins,
    /// [`PlatformError::InvalidTransition`] for a disallowed (or
    /// unchanged) target, and [`PlatformError::StateConflict`] if the row
    /// changed concurrently.
    pub async fn update_status(
        &self,
        actor: &Actor,
        id: SubscriptionId,
        new_status: SubscriptionStatus,
    ) -> Result<Subscription, PlatformError> {
        actor.require_admin("change subscription status")?;
        let sub = self.get_subscription(actor, id).await?;
        let expected = sub.status;
        let mut next = sub;
        next.transition(new_status, Utc::now())?;
        self.commit(&mut next, expected, "admin").await?;
        Ok(next)
    }

    /// Admin edit of status, dates and restaurant fields.
    ///
    /// A status equal to the current one is ignored. An unchanged patch
    /// returns the entity without writing.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Forbidden`] for non-admins, validation or
    /// transition errors for bad input, and
    /// [`PlatformError::StateConflict`] on a lost race.
    pub async fn update_subscription(
        &self,
        actor: &Actor,
        id: SubscriptionId,
        patch: SubscriptionPatch,
    ) -> Result<Subscription, PlatformError> {
        actor.require_admin("edit subscriptions")?;
        let current = self.get_subscription(actor, id).await?;
        let now = Utc::now();
        let mut next = current.clone();
        let mut fields: Vec<&'static str> = Vec::new();

        if let Some(status) = patch.status.filter(|s| *s != current.status) {
            next.transition(status, now)?;
            fields.push("status");
        }

        let base = &current.restaurant;
        let restaurant = RestaurantInfo {
            name: patch.restaurant_name.unwrap_or_else(|| base.name.clone()),
            address: patch.restaurant_address.unwrap_or_else(|| base.address.clone()),
            phone: patch.restaurant_phone.unwrap_or_else(|| base.phone.clone()),
            restaurant_type: patch
                .restaurant_type
                .unwrap_or_else(|| base.restaurant_type.clone()),
            description: patch.description.or_else(|| base.description.clone()),
        }
        .normalized()?;
        push_if(&mut fields, restaurant.name != current.restaurant.name, "restaurant_name");
        push_if(
            &mut fields,
            restaurant.address != current.restaurant.address,
            "restaurant_address",
        );
        push_if(&mut fields, restaurant.phone != current.restaurant.phone, "restaurant_phone");
        push_if(
            &mut fields,
            restaurant.restaurant_type != current.restaurant.restaurant_type,
            "restaurant_type",
        );
        push_if(
            &mut fields,
            restaurant.description != current.restaurant.description,
            "description",
        );
        next.restaurant = restaurant;

        if let Some(start) = patch.start_date.filter(|s| Some(*s) != next.start_date) {
            next.start_date = Some(start);
            next.derive_end_date()?;
            fields.push("start_date");
        }
        if let Some(end) = patch.end_date {
            if next.start_date.is_some_and(|start| end <= start) {
                return Err(PlatformError::Validation(
                    "end_date must be after start_date".to_string(),
                ));
            }
            next.end_date = Some(end);
        }
        push_if(&mut fields, next.end_date != current.end_date, "end_date");

        if fields.is_empty() {
            return Ok(current);
        }
        next.updated_at = now;

        self.write(&mut next, current.status).await?;
        if next.status != current.status {
            self.publish_status_change(&current, next.status, "admin", now);
        }
        self.event_bus.publish(LifecycleEvent::SubscriptionUpdated {
            subscription_id: id,
            fields,
            timestamp: now,
        });
        Ok(next)
    }

    /// Cancels a non-terminal subscription. Owner or admin.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::NotFound`] if not visible,
    /// [`PlatformError::InvalidTransition`] if already terminal, and
    /// [`PlatformError::StateConflict`] on a lost race.
    pub async fn cancel_subscription(
        &self,
        actor: &Actor,
        id: SubscriptionId,
    ) -> Result<Subscription, PlatformError> {
        let sub = self.get_subscription(actor, id).await?;
        let expected = sub.status;
        let mut next = sub;
        next.transition(SubscriptionStatus::Cancelled, Utc::now())?;
        let trigger = if actor.is_admin() { "admin" } else { "owner" };
        self.commit(&mut next, expected, trigger).await?;
        Ok(next)
    }

    /// Soft-deletes a subscription. Admin only; the instance is untouched.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Forbidden`], [`PlatformError::NotFound`],
    /// or [`PlatformError::StateConflict`].
    pub async fn delete_subscription(
        &self,
        actor: &Actor,
        id: SubscriptionId,
    ) -> Result<Subscription, PlatformError> {
        actor.require_admin("delete subscriptions")?;
        let mut sub = self.get_subscription(actor, id).await?;
        let now = Utc::now();
        sub.deleted_at = Some(now);
        sub.updated_at = now;
        let status = sub.status;
        self.write(&mut sub, status).await?;
        self.event_bus.publish(LifecycleEvent::SubscriptionDeleted {
            subscription_id: id,
            timestamp: now,
        });
        tracing::info!(subscription_id = %id, "subscription deleted");
        Ok(sub)
    }

    /// Expires every ACTIVE subscription whose `end_date` has passed.
    ///
    /// Returns the number of subscriptions expired. Rows that changed
    /// concurrently are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Persistence`] on storage failure.
    pub async fn expire_due(&self, now: DateTime<Utc>) -> Result<usize, PlatformError> {
        let active = self
            .store
            .list_subscriptions(SubscriptionFilter {
                user_id: None,
                status: Some(SubscriptionStatus::Active),
            })
            .await?;
        let mut expired = 0;
        for sub in active.into_iter().filter(|s| s.is_due_for_expiry(now)) {
            if self
                .sweep_one(sub, SubscriptionStatus::Expired, now)
                .await?
            {
                expired += 1;
            }
        }
        Ok(expired)
    }

    /// Cancels PENDING subscriptions older than the configured TTL.
    ///
    /// Does nothing when no TTL is configured.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Persistence`] on storage failure.
    pub async fn cancel_stale_pending(&self, now: DateTime<Utc>) -> Result<usize, PlatformError> {
        let Some(ttl) = self.pending_ttl else {
            return Ok(0);
        };
        let pending = self
            .store
            .list_subscriptions(SubscriptionFilter {
                user_id: None,
                status: Some(SubscriptionStatus::Pending),
            })
            .await?;
        let mut cancelled = 0;
        for sub in pending.into_iter().filter(|s| s.created_at + ttl <= now) {
            if self
                .sweep_one(sub, SubscriptionStatus::Cancelled, now)
                .await?
            {
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }

    async fn sweep_one(
        &self,
        sub: Subscription,
        to: SubscriptionStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, PlatformError> {
        let expected = sub.status;
        let id = sub.id;
        let mut next = sub;
        next.transition(to, now)?;
        match self.commit(&mut next, expected, "sweeper").await {
            Ok(()) => Ok(true),
            Err(PlatformError::StateConflict(_)) => {
                tracing::debug!(subscription_id = %id, "sweep skipped, row changed concurrently");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Bumps the revision and writes `next`, guarded on the status and
    /// revision it was read with.
    async fn write(
        &self,
        next: &mut Subscription,
        expected: SubscriptionStatus,
    ) -> Result<(), PlatformError> {
        let read_revision = next.revision;
        next.revision = read_revision.saturating_add(1);
        if self
            .store
            .replace_subscription(next, expected, read_revision)
            .await?
        {
            Ok(())
        } else {
            Err(conflict(next.id))
        }
    }

    /// Compare-and-swap write plus status-change event.
    async fn commit(
        &self,
        next: &mut Subscription,
        expected: SubscriptionStatus,
        trigger: &'static str,
    ) -> Result<(), PlatformError> {
        self.write(next, expected).await?;
        self.event_bus.publish(LifecycleEvent::SubscriptionStatusChanged {
            subscription_id: next.id,
            from: expected,
            to: next.status,
            trigger,
            timestamp: next.updated_at,
        });
        tracing::info!(
            subscription_id = %next.id,
            from = %expected,
            to = %next.status,
            trigger,
            "subscription status changed"
        );
        Ok(())
    }

    fn publish_status_change(
        &self,
        before: &Subscription,
        to: SubscriptionStatus,
        trigger: &'static str,
        now: DateTime<Utc>,
    ) {
        self.event_bus.publish(LifecycleEvent::SubscriptionStatusChanged {
            subscription_id: before.id,
            from: before.status,
            to,
            trigger,
            timestamp: now,
        });
    }
}

fn push_if(fields: &mut Vec<&'static str>, changed: bool, name: &'static str) {
    if changed {
        fields.push(name);
    }
}

fn conflict(id: SubscriptionId) -> PlatformError {
    PlatformError::StateConflict(format!("subscription {id} changed concurrently"))
}
