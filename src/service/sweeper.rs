//! Periodic lifecycle sweep: expiry of lapsed subscriptions and, when a
//! TTL is configured, cancellation of abandoned checkouts.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::SubscriptionService;

/// Runs one sweep and logs what it changed.
pub async fn sweep_once(subscriptions: &SubscriptionService) {
    let now = Utc::now();
    match subscriptions.expire_due(now).await {
        Ok(0) => {}
        Ok(expired) => tracing::info!(expired, "expired lapsed subscriptions"),
        Err(e) => tracing::warn!(error = %e, "expiry sweep failed"),
    }
    match subscriptions.cancel_stale_pending(now).await {
        Ok(0) => {}
        Ok(cancelled) => tracing::info!(cancelled, "cancelled stale pending subscriptions"),
        Err(e) => tracing::warn!(error = %e, "pending sweep failed"),
    }
}

/// Spawns the sweeper on a fixed interval. The first sweep runs
/// immediately.
pub fn spawn_sweeper(subscriptions: Arc<SubscriptionService>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            sweep_once(&subscriptions).await;
        }
    })
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::domain::{
        Actor, EventBus, PlanCatalog, PlanId, RestaurantInfo, Subscription, SubscriptionDuration,
        SubscriptionStatus, UserId,
    };
    use crate::persistence::memory::MemoryStore;
    use crate::persistence::{LifecycleStore, SubscriptionStore};

    #[tokio::test]
    async fn sweep_expires_lapsed_and_cancels_stale() {
        let store = Arc::new(MemoryStore::new());
        let service = SubscriptionService::new(
            Arc::clone(&store) as Arc<dyn LifecycleStore>,
            Arc::new(PlanCatalog::builtin()),
            EventBus::new(16),
            Some(ChronoDuration::hours(24)),
        );

        let restaurant = RestaurantInfo {
            name: "Com Tam Ba Ghien".to_string(),
            address: "84 Dang Van Ngu, Phu Nhuan".to_string(),
            phone: "028 3846 1073".to_string(),
            restaurant_type: "broken rice".to_string(),
            description: None,
        };
        let long_ago = Utc::now() - ChronoDuration::days(400);

        let mut lapsed = Subscription::new(
            UserId::new(),
            PlanId::new(),
            restaurant.clone(),
            SubscriptionDuration::OneMonth,
            long_ago,
        );
        lapsed.status = SubscriptionStatus::Active;
        lapsed.start_date = Some(long_ago);
        let Ok(()) = lapsed.derive_end_date() else {
            panic!("end date");
        };
        let stale = Subscription::new(
            UserId::new(),
            PlanId::new(),
            restaurant,
            SubscriptionDuration::OneMonth,
            long_ago,
        );
        let (Ok(()), Ok(())) = (
            store.insert_subscription(&lapsed).await,
            store.insert_subscription(&stale).await,
        ) else {
            panic!("seed");
        };

        sweep_once(&service).await;

        let admin = Actor::admin(UserId::new());
        let (Ok(lapsed), Ok(stale)) = (
            service.get_subscription(&admin, lapsed.id).await,
            service.get_subscription(&admin, stale.id).await,
        ) else {
            panic!("read back");
        };
        assert_eq!(lapsed.status, SubscriptionStatus::Expired);
        assert_eq!(stale.status, SubscriptionStatus::Cancelled);
    }
}
