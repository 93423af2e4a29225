//! # SubscriberSet: non-blocking fan-out over multiple subscribers.
//!
//! ```text
//!    emit(&Event)
//!        │                        (Arc-clone per subscriber)
//!        ├────────────────► [queue S1] ─► worker S1 ─► on_event()
//!        ├────────────────► [queue S2] ─► worker S2 ─► on_event()
//!        └────────────────► [queue SN] ─► worker SN ─► on_event()
//! ```
//!
//! - `emit` returns immediately (`try_send`); a full or closed queue drops the
//!   event for that subscriber and publishes `SubscriberOverflow` on the bus.
//! - Overflow events are never re-reported when they overflow themselves.
//! - A panicking subscriber is reported as `SubscriberPanicked` and keeps
//!   receiving later events.

use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;

use crate::error::panic_message;
use crate::events::{Bus, Event, EventKind};
use crate::subscribers::Subscribe;

struct SubscriberChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Event>>,
}

/// Fan-out coordinator for event subscribers.
pub(crate) struct SubscriberSet {
    channels: Vec<SubscriberChannel>,
    bus: Bus,
}

impl SubscriberSet {
    /// Creates the set and spawns one worker task per subscriber.
    #[must_use]
    pub(crate) fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let channels = subs
            .into_iter()
            .map(|sub| {
                let name = sub.name();
                let (tx, rx) = mpsc::channel::<Arc<Event>>(sub.queue_capacity().max(1));
                tokio::spawn(worker(sub, rx, bus.clone()));
                SubscriberChannel { name, sender: tx }
            })
            .collect();

        Self { channels, bus }
    }

    pub(crate) fn len(&self) -> usize {
        self.channels.len()
    }

    /// Emits an event to all subscribers.
    pub(crate) fn emit(&self, event: &Event) {
        if self.channels.is_empty() {
            return;
        }
        let event = Arc::new(event.clone());
        let is_overflow = event.kind == EventKind::SubscriberOverflow;

        for channel in &self.channels {
            let reason = match channel.sender.try_send(Arc::clone(&event)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            if !is_overflow {
                self.bus
                    .publish(Event::subscriber_overflow(channel.name, reason));
            }
        }
    }
}

async fn worker(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>, bus: Bus) {
    while let Some(ev) = rx.recv().await {
        let handled = std::panic::AssertUnwindSafe(sub.on_event(&ev))
            .catch_unwind()
            .await;
        if let Err(panic) = handled {
            bus.publish(Event::subscriber_panicked(
                sub.name(),
                panic_message(&*panic),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct Collect(Mutex<Vec<EventKind>>);

    #[async_trait]
    impl Subscribe for Collect {
        async fn on_event(&self, ev: &Event) {
            self.0.lock().push(ev.kind);
        }

        fn name(&self) -> &'static str {
            "collect"
        }
    }

    struct Explode;

    #[async_trait]
    impl Subscribe for Explode {
        async fn on_event(&self, ev: &Event) {
            if ev.kind == EventKind::WaitExpired {
                panic!("cannot handle expiry");
            }
        }

        fn name(&self) -> &'static str {
            "explode"
        }
    }

    #[tokio::test]
    async fn test_fans_out_in_order() {
        let bus = Bus::new(16);
        let a = Arc::new(Collect::default());
        let b = Arc::new(Collect::default());
        let set = SubscriberSet::new(vec![a.clone() as Arc<dyn Subscribe>, b.clone()], bus);
        assert_eq!(set.len(), 2);

        set.emit(&Event::new(EventKind::WaitRegistered));
        set.emit(&Event::new(EventKind::WaitResumed));
        tokio::time::sleep(Duration::from_millis(20)).await;

        let expected = vec![EventKind::WaitRegistered, EventKind::WaitResumed];
        assert_eq!(*a.0.lock(), expected);
        assert_eq!(*b.0.lock(), expected);
    }

    #[tokio::test]
    async fn test_panic_is_reported_and_worker_survives() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let set = SubscriberSet::new(vec![Arc::new(Explode) as Arc<dyn Subscribe>], bus);

        set.emit(&Event::new(EventKind::WaitExpired));
        set.emit(&Event::new(EventKind::WaitExpired));
        tokio::time::sleep(Duration::from_millis(20)).await;

        let first = rx.try_recv().unwrap();
        assert_eq!(first.kind, EventKind::SubscriberPanicked);
        assert!(first.reason.unwrap().contains("cannot handle expiry"));
        assert_eq!(rx.try_recv().unwrap().kind, EventKind::SubscriberPanicked);
    }
}
