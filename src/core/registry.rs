//! # Wait registry: pending waits keyed by (scope, pattern).
//!
//! [`WaitRegistry`] owns every [`PendingWait`] that can still be resumed, plus
//! the waits that were displaced by a newer wait on the same pattern.
//!
//! ```text
//! insert(wait) ──► CollisionPolicy ──► Displace: evict every wait on the pattern
//!                                 └──► Coexist:  evict the wait with the same key
//!                    evicted ──► displaced (timer disarmed, continuation parked)
//!
//! take_for_event(channel, sender, pattern)
//!     ├─ (channel, pattern)   channel wait wins
//!     └─ (sender, pattern)
//! ```
//!
//! ## Rules
//! - each wait is removed exactly once; whoever removes it owns its continuation
//! - displaced waits are never matched again; only cancel/shutdown release them
//! - internal lock is synchronous and never held across an `.await`

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::core::continuation::{Continuation, ContinuationState};
use crate::events::{Event, EventKind};
use crate::ids::{FiberId, WaitId};
use crate::message::Scope;
use crate::policies::{CollisionPolicy, InvalidatePolicy};

/// Identity of a pending wait in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct WaitKey {
    pub(crate) scope: Scope,
    pub(crate) pattern: Arc<str>,
}

impl WaitKey {
    pub(crate) fn new(scope: Scope, pattern: Arc<str>) -> Self {
        Self { scope, pattern }
    }
}

/// A registered suspension.
#[derive(Debug)]
pub(crate) struct PendingWait {
    pub(crate) id: WaitId,
    pub(crate) key: WaitKey,
    pub(crate) invalidate: InvalidatePolicy,
    pub(crate) timeout: Option<Duration>,
    pub(crate) continuation: Continuation,
    timer: Option<CancellationToken>,
}

impl PendingWait {
    pub(crate) fn new(
        id: WaitId,
        key: WaitKey,
        invalidate: InvalidatePolicy,
        timeout: Option<Duration>,
        continuation: Continuation,
        timer: Option<CancellationToken>,
    ) -> Self {
        Self {
            id,
            key,
            invalidate,
            timeout,
            continuation,
            timer,
        }
    }

    pub(crate) fn fiber(&self) -> FiberId {
        self.continuation.fiber()
    }

    /// Stops the expiry timer, if any.
    pub(crate) fn disarm(&self) {
        if let Some(timer) = &self.timer {
            timer.cancel();
        }
    }

    /// Event of `kind` describing this wait.
    pub(crate) fn event(&self, kind: EventKind) -> Event {
        Event::new(kind)
            .with_wait(self.id)
            .with_fiber(self.fiber())
            .with_pattern(Arc::clone(&self.key.pattern))
            .with_scope(self.key.scope.clone())
    }

    pub(crate) fn info(&self) -> WaitInfo {
        WaitInfo {
            id: self.id,
            fiber: self.fiber(),
            scope: self.key.scope.clone(),
            pattern: Arc::clone(&self.key.pattern),
            invalidate: self.invalidate,
            timeout: self.timeout,
            state: self.continuation.state(),
        }
    }
}

/// Read-only view of a pending wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitInfo {
    pub id: WaitId,
    pub fiber: FiberId,
    pub scope: Scope,
    pub pattern: Arc<str>,
    pub invalidate: InvalidatePolicy,
    pub timeout: Option<Duration>,
    pub state: ContinuationState,
}

#[derive(Default)]
struct Inner {
    waits: HashMap<WaitKey, PendingWait>,
    index: HashMap<WaitId, WaitKey>,
    displaced: Vec<PendingWait>,
}

impl Inner {
    fn remove_key(&mut self, key: &WaitKey) -> Option<PendingWait> {
        let wait = self.waits.remove(key)?;
        self.index.remove(&wait.id);
        Some(wait)
    }

    fn remove_id(&mut self, id: WaitId) -> Option<PendingWait> {
        let key = self.index.get(&id)?.clone();
        self.remove_key(&key)
    }
}

/// Registry of pending waits.
pub(crate) struct WaitRegistry {
    collision: CollisionPolicy,
    inner: Mutex<Inner>,
}

impl WaitRegistry {
    pub(crate) fn new(collision: CollisionPolicy) -> Self {
        Self {
            collision,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Registers `wait`; returns the waits it displaced.
    pub(crate) fn insert(&self, wait: PendingWait) -> Vec<WaitInfo> {
        let mut inner = self.inner.lock();

        let evict: Vec<WaitKey> = match self.collision {
            CollisionPolicy::Displace => inner
                .waits
                .keys()
                .filter(|k| k.pattern == wait.key.pattern)
                .cloned()
                .collect(),
            CollisionPolicy::Coexist => inner
                .waits
                .contains_key(&wait.key)
                .then(|| wait.key.clone())
                .into_iter()
                .collect(),
        };

        let mut displaced = Vec::with_capacity(evict.len());
        for key in evict {
            if let Some(old) = inner.remove_key(&key) {
                old.disarm();
                displaced.push(old.info());
                inner.displaced.push(old);
            }
        }

        inner.index.insert(wait.id, wait.key.clone());
        inner.waits.insert(wait.key.clone(), wait);
        displaced
    }

    /// Removes the wait a routed event resumes: channel scope first, then sender.
    pub(crate) fn take_for_event(
        &self,
        channel: Option<&Scope>,
        sender: &Scope,
        pattern: &Arc<str>,
    ) -> Option<PendingWait> {
        let mut inner = self.inner.lock();
        channel
            .into_iter()
            .chain(std::iter::once(sender))
            .find_map(|scope| inner.remove_key(&WaitKey::new(scope.clone(), Arc::clone(pattern))))
    }

    /// Removes an active wait by id.
    pub(crate) fn take(&self, id: WaitId) -> Option<PendingWait> {
        self.inner.lock().remove_id(id)
    }

    /// Removes a displaced wait by id.
    pub(crate) fn take_displaced(&self, id: WaitId) -> Option<PendingWait> {
        let mut inner = self.inner.lock();
        let pos = inner.displaced.iter().position(|w| w.id == id)?;
        Some(inner.displaced.swap_remove(pos))
    }

    /// Removes every next-message wait on any of `scopes`.
    ///
    /// The wait a message resumes must be taken out first; whatever is left
    /// on the message's scopes was not answered by it.
    pub(crate) fn take_next_message(&self, scopes: &[Scope]) -> Vec<PendingWait> {
        let mut inner = self.inner.lock();
        let keys: Vec<WaitKey> = inner
            .waits
            .iter()
            .filter(|(k, w)| {
                w.invalidate == InvalidatePolicy::NextMessage && scopes.contains(&k.scope)
            })
            .map(|(k, _)| k.clone())
            .collect();

        let mut taken: Vec<PendingWait> = keys.iter().filter_map(|k| inner.remove_key(k)).collect();
        taken.sort_by_key(|w| w.id);
        taken
    }

    /// Removes everything: `(active, displaced)`, each ordered by id.
    pub(crate) fn drain(&self) -> (Vec<PendingWait>, Vec<PendingWait>) {
        let mut inner = self.inner.lock();
        inner.index.clear();
        let mut active: Vec<PendingWait> = inner.waits.drain().map(|(_, w)| w).collect();
        let mut displaced = std::mem::take(&mut inner.displaced);
        active.sort_by_key(|w| w.id);
        displaced.sort_by_key(|w| w.id);
        (active, displaced)
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().waits.len()
    }

    pub(crate) fn displaced_len(&self) -> usize {
        self.inner.lock().displaced.len()
    }

    /// Active waits ordered by id.
    pub(crate) fn snapshot(&self) -> Vec<WaitInfo> {
        let inner = self.inner.lock();
        let mut out: Vec<WaitInfo> = inner.waits.values().map(PendingWait::info).collect();
        out.sort_by_key(|w| w.id);
        out
    }
}
