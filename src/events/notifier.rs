//! # Per-component notification channel.
//!
//! [`Notifier`] is a thin wrapper around [`tokio::sync::broadcast`] that a
//! component uses to announce its own [`ComponentEvent`]s.
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks.
//! - **Subscribe = receiver**: each [`Notifier::subscribe`] call returns an
//!   independent receiver; dropping it unsubscribes.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: events are lost if nobody is subscribed.

use tokio::sync::broadcast;

use super::event::ComponentEvent;

const DEFAULT_CAPACITY: usize = 64;

/// Broadcast channel for one component's lifecycle notifications.
///
/// Cheap to clone (shares the underlying sender).
#[derive(Clone, Debug)]
pub struct Notifier {
    tx: broadcast::Sender<ComponentEvent>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Notifier {
    /// Creates a notifier with the given ring-buffer capacity (min 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes to every current receiver; dropped if there are none.
    pub fn publish(&self, event: ComponentEvent) {
        let _ = self.tx.send(event);
    }

    /// Creates a receiver for events sent from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ComponentEvent> {
        self.tx.subscribe()
    }

    /// Number of live receivers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_see_events_after_subscribing() {
        let notifier = Notifier::default();
        notifier.publish(ComponentEvent::Started { id: "lost".into() });

        let mut rx = notifier.subscribe();
        notifier.publish(ComponentEvent::Stopped { id: "a".into() });

        assert_eq!(rx.recv().await.unwrap(), ComponentEvent::Stopped { id: "a".into() });
    }

    #[test]
    fn test_drop_unsubscribes() {
        let notifier = Notifier::default();
        let rx = notifier.subscribe();
        assert_eq!(notifier.receiver_count(), 1);
        drop(rx);
        assert_eq!(notifier.receiver_count(), 0);
    }
}
