//! # Invalidation policies for pending waits.
//!
//! [`InvalidatePolicy`] decides how a pending wait ends when no matching
//! event arrives:
//!
//! - [`InvalidatePolicy::Timed`] the wait expires after a timeout (default).
//! - [`InvalidatePolicy::NextMessage`] the wait is consumed by the first message
//!   from its source; a non-matching one invalidates it.
//!
//! [`WaitOptions`] bundles the policy with an optional explicit timeout.
//!
//! ## Choosing the right policy
//! ```text
//! "say `more` for more results"      → Timed (answer may come much later)
//! "confirm? (yes/no)"                 → NextMessage (anything else cancels)
//! ```

use std::time::Duration;

/// How a pending wait is invalidated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InvalidatePolicy {
    /// Expire after a timeout (explicit, or [`Config::invalidate_after`](crate::Config::invalidate_after)).
    #[default]
    Timed,
    /// Invalidate on the first non-matching message from the same source.
    NextMessage,
}

impl InvalidatePolicy {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            InvalidatePolicy::Timed => "timed",
            InvalidatePolicy::NextMessage => "next_message",
        }
    }
}

/// Options accepted by [`Fiber::suspend`](crate::Fiber::suspend).
///
/// ## Example
/// ```rust
/// use std::time::Duration;
/// use fibervisor::{InvalidatePolicy, WaitOptions};
///
/// let opts = WaitOptions::timed(Duration::from_secs(30));
/// assert_eq!(opts.invalidate, InvalidatePolicy::Timed);
///
/// let opts = WaitOptions::next_message();
/// assert_eq!(opts.timeout, None);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WaitOptions {
    /// Invalidation policy.
    pub invalidate: InvalidatePolicy,
    /// Explicit timeout, used only with [`InvalidatePolicy::Timed`].
    ///
    /// `None` falls back to the dispatcher's configured default.
    pub timeout: Option<Duration>,
}

impl WaitOptions {
    /// Timed wait with an explicit timeout.
    pub fn timed(timeout: Duration) -> Self {
        Self {
            invalidate: InvalidatePolicy::Timed,
            timeout: Some(timeout),
        }
    }

    /// Wait consumed by the next message from the same source.
    pub fn next_message() -> Self {
        Self {
            invalidate: InvalidatePolicy::NextMessage,
            timeout: None,
        }
    }

    /// Resolves the effective timeout: `None` for next-message waits,
    /// the explicit timeout or `default` for timed ones.
    pub fn effective_timeout(&self, default: Duration) -> Option<Duration> {
        match self.invalidate {
            InvalidatePolicy::Timed => Some(self.timeout.unwrap_or(default)),
            InvalidatePolicy::NextMessage => None,
        }
    }
}
