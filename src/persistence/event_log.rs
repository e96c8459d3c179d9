//! Background task that appends lifecycle events to the audit log.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use super::LifecycleStore;
use crate::domain::EventBus;

/// Subscribes to `bus` and writes every event through `store`.
///
/// The task ends when the bus is dropped. A lagging receiver logs how many
/// events were lost and keeps going; a failed write is logged and skipped.
pub fn spawn_event_log(bus: &EventBus, store: Arc<dyn LifecycleStore>) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Err(e) = store.save_event(&event).await {
                        tracing::warn!(
                            error = %e,
                            event_type = event.event_type_str(),
                            "failed to persist lifecycle event"
                        );
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event log lagged behind the event bus");
                }
                Err(RecvError::Closed) => break,
            }
        }
        tracing::debug!("event log writer stopped");
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::{LifecycleEvent, SubscriptionId};
    use crate::persistence::memory::MemoryStore;

    #[tokio::test]
    async fn events_reach_the_store() {
        let bus = EventBus::new(16);
        let store = Arc::new(MemoryStore::new());
        let handle = spawn_event_log(&bus, Arc::clone(&store) as Arc<dyn LifecycleStore>);

        let subscription_id = SubscriptionId::new();
        bus.publish(LifecycleEvent::SubscriptionDeleted {
            subscription_id,
            timestamp: Utc::now(),
        });
        drop(bus);
        let _ = handle.await;

        let events = store.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(
            events.first().map(LifecycleEvent::aggregate_id),
            Some(subscription_id.into())
        );
    }
}
