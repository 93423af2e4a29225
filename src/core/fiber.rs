//! # Fibers: handler executions that can suspend mid-way.
//!
//! A fiber is a handler future running on its own tokio task. Only one segment
//! of one fiber runs at a time: whoever starts or resumes a fiber holds the
//! receiving end of a one-shot *baton* and awaits it until the fiber hands
//! control back.
//!
//! ```text
//! dispatcher                         fiber task
//! ──────────                         ──────────
//! start(handler) ──spawn────────────► handler.spawn(fiber, event)
//!     │ await baton                       │ ...
//!     │                                   │ fiber.suspend(scope, pattern)
//!     │                                   │   ├─ registry.insert + binder.acquire
//!     │ ◄──────── Parked(wait) ───────────┤   └─ hand back baton, await resume
//!  returns
//!     ...
//! resume(event) ──Resumption{baton}──────►│ suspend returns Ok(event)
//!     │ await baton                       │ ...
//!     │ ◄──────── Finished(result) ───────┘ handler returns
//!  returns
//! ```
//!
//! ## Rules
//! - `suspend` on the root context fails with [`WaitError::ProtocolMisuse`]
//!   and registers nothing
//! - the wait is registered before the baton is handed back, so a resume can
//!   never observe a fiber that is "about to" park
//! - a handler panic is caught and reported as [`HandlerError::Panicked`]
//! - a fiber whose baton is dropped without a status is reported as
//!   [`FiberStatus::Lost`]

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::core::continuation::{Continuation, Resumption};
use crate::core::dispatcher::Core;
use crate::core::invalidation;
use crate::core::registry::{PendingWait, WaitKey};
use crate::error::{HandlerError, WaitError, panic_message};
use crate::events::{Event, EventKind};
use crate::handlers::HandlerRef;
use crate::ids::{FiberId, WaitId};
use crate::message::{RoutedEvent, Scope};
use crate::policies::WaitOptions;

/// Sending end of a baton.
pub(crate) type Baton = oneshot::Sender<FiberStatus>;

/// What a fiber reported when it handed control back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FiberStatus {
    /// Suspended on a pending wait.
    Parked(WaitId),
    /// Handler returned (or panicked).
    Finished(Result<(), HandlerError>),
    /// The fiber's task went away without reporting.
    Lost,
}

impl FiberStatus {
    /// Returns `true` while the fiber waits to be resumed.
    pub fn is_parked(&self) -> bool {
        matches!(self, FiberStatus::Parked(_))
    }
}

/// Baton of the segment currently running; refilled on every resume.
struct BatonSlot(Mutex<Option<Baton>>);

impl BatonSlot {
    fn new(baton: Baton) -> Self {
        Self(Mutex::new(Some(baton)))
    }

    fn put(&self, baton: Baton) {
        *self.0.lock() = Some(baton);
    }

    fn hand_back(&self, status: FiberStatus) {
        if let Some(baton) = self.0.lock().take() {
            let _ = baton.send(status);
        }
    }
}

/// Execution context handed to every handler.
///
/// Handlers routed with `fiber: true` receive a fiber that may
/// [`suspend`](Fiber::suspend); every other handler receives the root context.
pub struct Fiber {
    id: FiberId,
    core: Weak<Core>,
    baton: Option<Arc<BatonSlot>>,
}

impl Fiber {
    pub(crate) fn root(core: Weak<Core>) -> Self {
        Self {
            id: FiberId::ROOT,
            core,
            baton: None,
        }
    }

    pub fn id(&self) -> FiberId {
        self.id
    }

    /// Returns `true` for the root (non-suspendable) context.
    pub fn is_root(&self) -> bool {
        self.baton.is_none()
    }

    /// Parks this fiber until a message from `source` matches `pattern`.
    ///
    /// Registers a pending wait, binds a resume rule for `pattern` if needed, and
    /// hands control back to whoever is driving the fiber. Returns the routed
    /// event that resumed it, or why the wait ended without one.
    ///
    /// # Errors
    /// - [`WaitError::ProtocolMisuse`]: called from the root context
    /// - [`WaitError::Expired`]: a timed wait elapsed
    /// - [`WaitError::Invalidated`]: a next-message wait saw another message
    /// - [`WaitError::Cancelled`]: cancelled, or the dispatcher is shutting down
    pub async fn suspend(
        &mut self,
        source: Scope,
        pattern: impl Into<Arc<str>>,
        options: WaitOptions,
    ) -> Result<RoutedEvent, WaitError> {
        let pattern: Arc<str> = pattern.into();

        let Some(slot) = self.baton.clone() else {
            if let Some(core) = self.core.upgrade() {
                core.publish(
                    Event::new(EventKind::ProtocolMisuse)
                        .with_fiber(self.id)
                        .with_pattern(pattern)
                        .with_scope(source),
                );
            }
            return Err(WaitError::ProtocolMisuse);
        };

        let core = self.core.upgrade().ok_or(WaitError::Cancelled)?;
        if core.is_closed() {
            return Err(WaitError::Cancelled);
        }

        let (tx, rx) = oneshot::channel::<Resumption>();
        let id = WaitId::next();
        let timeout = options.effective_timeout(core.config().invalidate_after);
        let timer = timeout.map(|_| core.timer_token());

        core.park(PendingWait::new(
            id,
            WaitKey::new(source, pattern),
            options.invalidate,
            timeout,
            Continuation::new(self.id, tx),
            timer.clone(),
        ));
        if let (Some(after), Some(token)) = (timeout, timer) {
            invalidation::arm(&core, id, after, token);
        }
        drop(core);

        slot.hand_back(FiberStatus::Parked(id));

        let Resumption { outcome, baton } = rx.await.map_err(|_| WaitError::Cancelled)?;
        slot.put(baton);
        outcome.into_result()
    }
}

impl std::fmt::Debug for Fiber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fiber")
            .field("id", &self.id)
            .field("root", &self.is_root())
            .finish()
    }
}

/// Starts `handler` in a new fiber and drives it until it parks or finishes.
pub(crate) async fn start(
    core: &Arc<Core>,
    handler: HandlerRef,
    event: RoutedEvent,
) -> (FiberId, FiberStatus) {
    let id = FiberId::next();
    let (baton, status_rx) = oneshot::channel();
    let slot = Arc::new(BatonSlot::new(baton));
    let fiber = Fiber {
        id,
        core: Arc::downgrade(core),
        baton: Some(Arc::clone(&slot)),
    };

    core.publish(
        Event::new(EventKind::FiberStarted)
            .with_fiber(id)
            .with_pattern(Arc::clone(event.pattern()))
            .with_reason(handler.name().to_string()),
    );

    tokio::spawn(async move {
        let res = run_guarded(handler, fiber, event).await;
        slot.hand_back(FiberStatus::Finished(res));
    });

    (id, core.drive(id, status_rx).await)
}

/// Runs `handler` inline on the root context.
pub(crate) async fn run_root(core: &Arc<Core>, handler: HandlerRef, event: RoutedEvent) -> FiberStatus {
    let fiber = Fiber::root(Arc::downgrade(core));
    let status = FiberStatus::Finished(run_guarded(handler, fiber, event).await);
    core.report(FiberId::ROOT, &status);
    status
}

/// Runs `handler` on the root context in a detached task.
pub(crate) fn detach(core: &Arc<Core>, handler: HandlerRef, event: RoutedEvent) {
    let weak = Arc::downgrade(core);
    tokio::spawn(async move {
        let res = run_guarded(handler, Fiber::root(weak.clone()), event).await;
        if let Some(core) = weak.upgrade() {
            core.report(FiberId::ROOT, &FiberStatus::Finished(res));
        }
    });
}

async fn run_guarded(handler: HandlerRef, fiber: Fiber, event: RoutedEvent) -> Result<(), HandlerError> {
    let fut = async move { handler.spawn(fiber, event).await };
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(res) => res,
        Err(panic) => Err(HandlerError::Panicked {
            info: panic_message(&*panic),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_baton_slot_hands_back_once() {
        let (tx, rx) = oneshot::channel();
        let slot = BatonSlot::new(tx);

        slot.hand_back(FiberStatus::Lost);
        slot.hand_back(FiberStatus::Finished(Ok(())));

        assert_eq!(rx.await.unwrap(), FiberStatus::Lost);
    }

    #[test]
    fn test_only_parked_status_is_parked() {
        assert!(FiberStatus::Parked(WaitId::next()).is_parked());
        assert!(!FiberStatus::Finished(Ok(())).is_parked());
        assert!(!FiberStatus::Lost.is_parked());
    }

    #[tokio::test]
    async fn test_root_fiber_without_runtime_is_misuse() {
        let mut root = Fiber::root(Weak::new());
        assert!(root.is_root());
        assert_eq!(
            root.suspend(Scope::user("alice"), "yes", WaitOptions::default())
                .await
                .unwrap_err(),
            WaitError::ProtocolMisuse
        );
    }
}
