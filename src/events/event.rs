//! # Runtime events emitted by the dispatcher, fibers and the wait registry.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Fiber events**: handler execution flow (started, parked, stopped, failed, dead)
//! - **Wait events**: pending wait lifecycle (registered, displaced, resumed, expired, ...)
//! - **Routing events**: resume-rule binding and unmatched deliveries
//! - **Runtime events**: shutdown and subscriber health
//!
//! The [`Event`] struct carries additional metadata such as timestamps, wait and
//! fiber ids, the pattern and scope involved, and reasons.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use fibervisor::{Event, EventKind, Scope};
//!
//! let ev = Event::new(EventKind::WaitRegistered)
//!     .with_pattern("page_to :page")
//!     .with_scope(Scope::user("alice"))
//!     .with_reason("timed");
//!
//! assert_eq!(ev.kind, EventKind::WaitRegistered);
//! assert_eq!(ev.pattern.as_deref(), Some("page_to :page"));
//! assert_eq!(ev.reason.as_deref(), Some("timed"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::ids::{FiberId, WaitId};
use crate::message::Scope;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Fiber events ===
    /// A handler started running in a new fiber.
    ///
    /// Sets: `fiber`, `pattern` (route that spawned it)
    FiberStarted,

    /// A fiber suspended and handed control back to the dispatcher.
    ///
    /// Sets: `fiber`, `wait`
    FiberParked,

    /// A fiber finished (successfully, or gracefully after a lost wait).
    ///
    /// Sets: `fiber`, `reason` (label of the graceful wait error, if any)
    FiberStopped,

    /// A fiber's handler returned a non-fatal error.
    ///
    /// Sets: `fiber`, `reason`
    FiberFailed,

    /// A fiber ended with a fatal error, a panic, or protocol misuse.
    ///
    /// Sets: `fiber`, `reason`
    FiberDead,

    // === Wait events ===
    /// A pending wait was registered.
    ///
    /// Sets: `wait`, `fiber`, `pattern`, `scope`, `reason` (invalidate policy), `timeout_ms`
    WaitRegistered,

    /// A pending wait was evicted by a newer wait on the same pattern.
    /// Its continuation stays parked.
    ///
    /// Sets: `wait`, `pattern`, `scope`, `reason` (`by wait#N displaced=M`, M being the
    /// number of displaced waits still parked)
    WaitDisplaced,

    /// A pending wait was matched and its continuation resumed.
    ///
    /// Sets: `wait`, `fiber`, `pattern`, `scope`
    WaitResumed,

    /// A timed wait elapsed without a match.
    ///
    /// Sets: `wait`, `fiber`, `pattern`, `scope`, `timeout_ms`
    WaitExpired,

    /// A next-message wait saw a non-matching message from its source.
    ///
    /// Sets: `wait`, `fiber`, `pattern`, `scope`
    WaitInvalidated,

    /// A wait was cancelled explicitly or by shutdown.
    ///
    /// Sets: `wait`, `fiber`, `pattern`, `scope`
    WaitCancelled,

    /// A routed event found no pending wait (diagnostic, not a failure).
    ///
    /// Sets: `pattern`, `scope` (sender scope)
    NoPendingWait,

    /// A continuation found in the registry could not be resumed.
    ///
    /// Sets: `wait`, `fiber`, `pattern`, `reason`
    StaleResume,

    /// `suspend` was called from a root context.
    ///
    /// Sets: `fiber` (root), `pattern`, `scope`
    ProtocolMisuse,

    // === Routing events ===
    /// A resume rule was registered with the router.
    ///
    /// Sets: `pattern`
    PatternBound,

    /// A resume rule was removed from the router (last reference released).
    ///
    /// Sets: `pattern`
    PatternUnbound,

    /// A dispatched message matched no route.
    ///
    /// Sets: `scope` (sender scope)
    MessageUnrouted,

    // === Runtime events ===
    /// Shutdown requested (OS signal, closed inbox, or explicit close).
    ShutdownRequested,

    /// All waits were released within the configured grace period.
    AllStoppedWithin,

    /// Grace period exceeded; some waits could not be released in time.
    GraceExceeded,

    /// Subscriber panicked during event processing.
    ///
    /// Sets: `reason` (subscriber name and panic info)
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `reason` (subscriber name and cause)
    SubscriberOverflow,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Debug, Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Pending wait involved, if any.
    pub wait: Option<WaitId>,
    /// Fiber involved, if any.
    pub fiber: Option<FiberId>,
    /// Pattern involved, if any.
    pub pattern: Option<Arc<str>>,
    /// Scope involved, if any.
    pub scope: Option<Scope>,
    /// Human-readable reason (error labels, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Wait timeout in milliseconds (compact).
    pub timeout_ms: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            wait: None,
            fiber: None,
            pattern: None,
            scope: None,
            reason: None,
            timeout_ms: None,
        }
    }

    #[inline]
    pub fn with_wait(mut self, id: WaitId) -> Self {
        self.wait = Some(id);
        self
    }

    #[inline]
    pub fn with_fiber(mut self, id: FiberId) -> Self {
        self.fiber = Some(id);
        self
    }

    #[inline]
    pub fn with_pattern(mut self, pattern: impl Into<Arc<str>>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    #[inline]
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a timeout duration (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.timeout_ms = Some(ms);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_reason(format!("subscriber={subscriber} info={info}"))
    }

    /// Returns `true` for anomalies worth a warning (dead fibers, stale resumes, misuse, ...).
    pub fn is_anomaly(&self) -> bool {
        matches!(
            self.kind,
            EventKind::FiberDead
                | EventKind::StaleResume
                | EventKind::ProtocolMisuse
                | EventKind::GraceExceeded
                | EventKind::SubscriberPanicked
                | EventKind::SubscriberOverflow
        )
    }
}
