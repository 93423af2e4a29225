//! Identifiers for fibers and pending waits.
//!
//! Both are process-local, monotonically increasing counters (like the event
//! sequence); they are never reused within a process.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

static WAIT_SEQ: AtomicU64 = AtomicU64::new(1);
static FIBER_SEQ: AtomicU64 = AtomicU64::new(1);

/// Identity of one suspension instance (one `suspend` call).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WaitId(u64);

impl WaitId {
    pub(crate) fn next() -> Self {
        Self(WAIT_SEQ.fetch_add(1, AtomicOrdering::Relaxed))
    }

    /// Returns the raw numeric id.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WaitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wait#{}", self.0)
    }
}

/// Identity of one fiber (one handler execution).
///
/// [`FiberId::ROOT`] names the root context: handlers run inline or detached,
/// which may not suspend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FiberId(u64);

impl FiberId {
    /// The root context sentinel.
    pub const ROOT: FiberId = FiberId(0);

    pub(crate) fn next() -> Self {
        Self(FIBER_SEQ.fetch_add(1, AtomicOrdering::Relaxed))
    }

    /// Returns `true` for the root context sentinel.
    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }

    /// Returns the raw numeric id.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str("fiber#root")
        } else {
            write!(f, "fiber#{}", self.0)
        }
    }
}
