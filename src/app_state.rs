//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::config::PlatformConfig;
use crate::domain::{EventBus, PlanCatalog};
use crate::payment::PaymentGateway;
use crate::persistence::LifecycleStore;
use crate::service::{
    HealthProbe, HealthService, InstanceService, PaymentService, ReconcilerService,
    SubscriptionService,
};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Subscription manager.
    pub subscriptions: Arc<SubscriptionService>,
    /// Checkout and webhook handling.
    pub payments: Arc<PaymentService>,
    /// Instance provisioner.
    pub instances: Arc<InstanceService>,
    /// Health reconciler.
    pub health: Arc<HealthService>,
    /// Status reconciler.
    pub reconciler: Arc<ReconcilerService>,
}

impl AppState {
    /// Wires every service over one store and one event bus.
    #[must_use]
    pub fn new(
        store: Arc<dyn LifecycleStore>,
        catalog: Arc<PlanCatalog>,
        gateway: Arc<dyn PaymentGateway>,
        probe: Arc<dyn HealthProbe>,
        event_bus: EventBus,
        config: &PlatformConfig,
    ) -> Self {
        let subscriptions = Arc::new(SubscriptionService::new(
            Arc::clone(&store),
            catalog,
            event_bus.clone(),
            config.pending_checkout_ttl(),
        ));
        let payments = Arc::new(PaymentService::new(
            Arc::clone(&store),
            Arc::clone(&subscriptions),
            gateway,
            event_bus.clone(),
            config.payment_return_url.clone(),
            config.payment_cancel_url.clone(),
        ));
        let instances = Arc::new(InstanceService::new(Arc::clone(&store), event_bus));
        let health = Arc::new(HealthService::new(Arc::clone(&store), probe));
        let reconciler = Arc::new(ReconcilerService::new(store));

        Self {
            subscriptions,
            payments,
            instances,
            health,
            reconciler,
        }
    }
}
