//! In-process fan-out of lifecycle events.
//!
//! Services publish a [`LifecycleEvent`] after each committed write. The
//! audit-log writer in `persistence::event_log` is the main subscriber; a
//! writer that falls behind by more than the capacity loses the oldest
//! entries and logs how many were skipped.

use tokio::sync::broadcast;

use super::LifecycleEvent;

/// Fan-out handle shared by the subscription, payment and instance services.
///
/// Capacity comes from `EVENT_BUS_CAPACITY`. Publishing never blocks a
/// request: with nobody listening the event is dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
    /// Creates a bus holding up to `capacity` undelivered events per
    /// subscriber (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Hands a committed change to every current subscriber and returns how
    /// many there were.
    pub fn publish(&self, event: LifecycleEvent) -> usize {
        tracing::debug!(
            event_type = event.event_type_str(),
            aggregate_id = %event.aggregate_id(),
            "lifecycle event"
        );
        self.sender.send(event).unwrap_or(0)
    }

    /// Attaches a subscriber that sees events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }
}
