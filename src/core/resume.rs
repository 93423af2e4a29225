//! # Resume path: routed event → pending wait → parked fiber.
//!
//! ```text
//! RoutedEvent(pattern, message)
//!     └─► registry.take_for_event(channel?, sender, pattern)
//!     └─► invalidation::on_message (every other NextMessage wait on the scopes)
//!            ├─ None        ──► NoPendingWait (diagnostic)
//!            └─ Some(wait)  ──► disarm timer, binder.release(pattern)
//!                               continuation.resume(Delivered(event))
//!                                  ├─ Ok(status_rx) ──► WaitResumed, drive fiber
//!                                  └─ Err(rejected) ──► StaleResume
//! ```
//!
//! The wait is removed from the registry before the fiber runs, so a second
//! event for the same wait can only ever find nothing.

use crate::core::continuation::Resume;
use crate::core::dispatcher::{Core, DispatchOutcome};
use crate::core::invalidation;
use crate::events::{Event, EventKind};
use crate::message::RoutedEvent;

/// Resumes the wait `event` answers; runs under the turn.
pub(crate) async fn on_routed_event(core: &Core, event: RoutedEvent) -> DispatchOutcome {
    let message = event.message().clone();
    let sender = message.sender_scope();
    let channel = message.channel_scope();

    let answered = core
        .registry()
        .take_for_event(channel.as_ref(), &sender, event.pattern());
    if let Some(wait) = &answered {
        core.retire(wait);
    }
    invalidation::on_message(core, &message).await;

    let Some(mut wait) = answered else {
        core.publish(
            Event::new(EventKind::NoPendingWait)
                .with_pattern(event.pattern().clone())
                .with_scope(sender),
        );
        core.diagnose(&message, &format!("nothing is waiting for '{}'", event.pattern()));
        return DispatchOutcome::NoPendingWait;
    };

    let (id, fiber) = (wait.id, wait.fiber());

    match wait.continuation.resume(Resume::Delivered(event)) {
        Ok(status_rx) => {
            core.publish(wait.event(EventKind::WaitResumed));
            let status = core.drive(fiber, status_rx).await;
            DispatchOutcome::Resumed {
                wait: id,
                fiber,
                status,
            }
        }
        Err(rejected) => {
            core.stale(&wait, rejected);
            core.diagnose(&message, &format!("{id} can no longer be resumed"));
            DispatchOutcome::StaleResume { wait: id }
        }
    }
}
