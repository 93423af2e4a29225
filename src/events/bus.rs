//! # Broadcast bus carrying fiber and wait transitions.
//!
//! Every component that changes the state of a conversation reports it here:
//! the dispatcher when it routes or resumes, the fiber runner when a handler
//! parks or ends, the binder when a resume rule comes and goes, invalidation
//! timers when a wait expires, and subscriber workers when they overflow.
//!
//! ```text
//! Dispatcher ─┐
//! Fiber runner┼─► Bus (tokio broadcast ring) ─┬─► subscriber_listener ─► SubscriberSet
//! Binder      │                               └─► Dispatcher::subscribe() receivers
//! Timers     ─┘
//! ```
//!
//! Publishing never waits. A receiver that falls behind by more than the ring
//! capacity sees `RecvError::Lagged(n)` and loses the `n` oldest events; with
//! no receiver at all an event is simply discarded.

use tokio::sync::broadcast;

use super::event::Event;

/// Cloneable handle onto the runtime event ring.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus holding up to `capacity` undelivered events (at least 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Reports `ev` to every current observer.
    pub fn publish(&self, ev: Event) {
        // No observers is not an error: the dispatcher runs fine unobserved.
        let _ = self.tx.send(ev);
    }

    /// Opens a receiver that sees events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Number of open receivers, the subscriber listener included.
    pub fn observers(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use tokio::sync::broadcast::error::RecvError;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let bus = Bus::new(0);
        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::PatternBound).with_pattern("more"));

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::PatternBound);
        assert_eq!(ev.pattern.as_deref(), Some("more"));
    }

    #[test]
    fn test_unobserved_publish_is_discarded() {
        let bus = Bus::new(4);
        assert_eq!(bus.observers(), 0);
        bus.publish(Event::new(EventKind::ShutdownRequested));

        let mut rx = bus.subscribe();
        assert_eq!(bus.observers(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_slow_observer_lags() {
        let bus = Bus::new(2);
        let mut rx = bus.subscribe();
        for pattern in ["a", "b", "c"] {
            bus.publish(Event::new(EventKind::PatternBound).with_pattern(pattern));
        }

        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(1))));
        assert_eq!(rx.recv().await.unwrap().pattern.as_deref(), Some("b"));
    }
}
