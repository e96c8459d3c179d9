//! Cross-aggregate consistency checks between subscriptions and instances.
//!
//! Findings are data-quality signals for admins. Nothing here repairs
//! state: an ACTIVE subscription without an instance may be a failed
//! provisioning step that needs a human.

use std::collections::HashMap;

use serde::Serialize;
use utoipa::ToSchema;

use super::instance::QosInstance;
use super::subscription::{Subscription, SubscriptionStatus};
use super::{InstanceId, SubscriptionId};

/// Category of a reconciliation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum InconsistencyKind {
    /// Subscription is ACTIVE but has no live instance.
    ActiveWithoutInstance,
    /// Live instance whose subscription is EXPIRED or CANCELLED.
    OrphanedInstance,
    /// Live instance whose subscription is missing or deleted.
    InstanceWithoutSubscription,
}

/// One reconciliation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Inconsistency {
    /// Category.
    pub kind: InconsistencyKind,
    /// Subscription involved.
    pub subscription_id: SubscriptionId,
    /// Instance involved, if any.
    pub instance_id: Option<InstanceId>,
    /// Subscription status at check time, if the subscription exists.
    pub subscription_status: Option<SubscriptionStatus>,
    /// Human-readable description.
    pub message: String,
}

/// Cross-checks live subscriptions against live instances.
///
/// Deleted rows on either side are ignored as inputs (a deleted
/// subscription counts as missing).
#[must_use]
pub fn find_inconsistencies(
    subscriptions: &[Subscription],
    instances: &[QosInstance],
) -> Vec<Inconsistency> {
    let live_subs: HashMap<SubscriptionId, &Subscription> = subscriptions
        .iter()
        .filter(|s| !s.is_deleted())
        .map(|s| (s.id, s))
        .collect();
    let live_instances: HashMap<SubscriptionId, &QosInstance> = instances
        .iter()
        .filter(|i| !i.is_deleted())
        .map(|i| (i.subscription_id, i))
        .collect();

    let mut findings = Vec::new();

    for sub in live_subs.values() {
        if sub.status == SubscriptionStatus::Active && !live_instances.contains_key(&sub.id) {
            findings.push(Inconsistency {
                kind: InconsistencyKind::ActiveWithoutInstance,
                subscription_id: sub.id,
                instance_id: None,
                subscription_status: Some(sub.status),
                message: format!(
                    "subscription {} for '{}' is ACTIVE but has no provisioned instance",
                    sub.id, sub.restaurant.name
                ),
            });
        }
    }

    for instance in live_instances.values() {
        match live_subs.get(&instance.subscription_id) {
            None => findings.push(Inconsistency {
                kind: InconsistencyKind::InstanceWithoutSubscription,
                subscription_id: instance.subscription_id,
                instance_id: Some(instance.id),
                subscription_status: None,
                message: format!(
                    "instance {} references missing subscription {}",
                    instance.id, instance.subscription_id
                ),
            }),
            Some(sub) if sub.status.is_terminal() => findings.push(Inconsistency {
                kind: InconsistencyKind::OrphanedInstance,
                subscription_id: sub.id,
                instance_id: Some(instance.id),
                subscription_status: Some(sub.status),
                message: format!(
                    "instance {} is still live but subscription {} is {}",
                    instance.id, sub.id, sub.status
                ),
            }),
            Some(_) => {}
        }
    }

    findings.sort_by(|a, b| {
        a.subscription_id
            .cmp(&b.subscription_id)
            .then_with(|| a.instance_id.cmp(&b.instance_id))
    });
    findings
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::{PlanId, RestaurantInfo, ServiceStatus, SubscriptionDuration, UserId};

    fn subscription(status: SubscriptionStatus) -> Subscription {
        let mut sub = Subscription::new(
            UserId::new(),
            PlanId::new(),
            RestaurantInfo {
                name: "Bun Cha Huong Lien".to_string(),
                address: "24 Le Van Huu, Hanoi".to_string(),
                phone: "0243 943 4106".to_string(),
                restaurant_type: "vietnamese".to_string(),
                description: None,
            },
            SubscriptionDuration::ThreeMonths,
            Utc::now(),
        );
        sub.status = status;
        sub
    }

    fn instance_for(sub: &Subscription) -> QosInstance {
        let now = Utc::now();
        QosInstance {
            id: InstanceId::new(),
            subscription_id: sub.id,
            user_id: sub.user_id,
            db_name: None,
            front_end_url: None,
            back_end_url: None,
            status_db: ServiceStatus::Active,
            status_fe: ServiceStatus::Active,
            status_be: ServiceStatus::Active,
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

    #[test]
    fn active_without_instance_is_flagged() {
        let active = subscription(SubscriptionStatus::Active);
        let findings = find_inconsistencies(&[active.clone()], &[]);
        assert_eq!(findings.len(), 1);
        assert_eq!(
            findings.first().map(|f| f.kind),
            Some(InconsistencyKind::ActiveWithoutInstance)
        );
        assert_eq!(findings.first().map(|f| f.subscription_id), Some(active.id));
    }

    #[test]
    fn consistent_state_has_no_findings() {
        let active = subscription(SubscriptionStatus::Active);
        let paid = subscription(SubscriptionStatus::Paid);
        let pending = subscription(SubscriptionStatus::Pending);
        let instances = vec![instance_for(&active), instance_for(&paid)];
        assert!(find_inconsistencies(&[active, paid, pending], &instances).is_empty());
    }

    #[test]
    fn deleted_instance_does_not_count() {
        let active = subscription(SubscriptionStatus::Active);
        let mut inst = instance_for(&active);
        inst.deleted_at = Some(Utc::now());
        let findings = find_inconsistencies(&[active], &[inst]);
        assert_eq!(
            findings.first().map(|f| f.kind),
            Some(InconsistencyKind::ActiveWithoutInstance)
        );
    }

    #[test]
    fn instances_of_terminal_or_missing_subscriptions_are_flagged() {
        let cancelled = subscription(SubscriptionStatus::Cancelled);
        let ghost = subscription(SubscriptionStatus::Paid);
        let instances = vec![instance_for(&cancelled), instance_for(&ghost)];

        let findings = find_inconsistencies(&[cancelled], &instances);
        let kinds: Vec<InconsistencyKind> = findings.iter().map(|f| f.kind).collect();
        assert_eq!(findings.len(), 2);
        assert!(kinds.contains(&InconsistencyKind::OrphanedInstance));
        assert!(kinds.contains(&InconsistencyKind::InstanceWithoutSubscription));
    }
}
