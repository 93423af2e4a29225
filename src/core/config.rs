//! # Global runtime configuration.
//!
//! Provides [`Config`] centralized settings for the dispatcher runtime.
//!
//! Config is used in two ways:
//! 1. **Dispatcher creation**: `Dispatcher::builder(router).with_config(cfg)`
//! 2. **Wait defaults**: `WaitOptions::effective_timeout(cfg.invalidate_after)`
//!
//! ## Sentinel values
//! - `grace = 0s` → no wait on shutdown, report stuck waits immediately

use std::time::Duration;

use crate::policies::CollisionPolicy;

/// Global configuration for the dispatcher runtime.
///
/// ## Field semantics
/// - `bus_capacity`: Event bus ring buffer size (min 1; clamped by Bus)
/// - `invalidate_after`: Timeout for timed waits that don't set one explicitly
/// - `collision`: What a new wait does to existing waits on the same pattern
/// - `grace`: Maximum time `Dispatcher::run` spends releasing waits on shutdown
/// - `reply_diagnostics`: Reply to messages that hit no pending wait / a stale one
#[derive(Clone, Debug)]
pub struct Config {
    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,

    /// Default timeout for [`InvalidatePolicy::Timed`](crate::InvalidatePolicy::Timed) waits.
    pub invalidate_after: Duration,

    /// Collision policy for waits sharing a pattern.
    pub collision: CollisionPolicy,

    /// Maximum time to wait for outstanding waits to be released on shutdown.
    pub grace: Duration,

    /// Send diagnostic replies through [`Message::reply`](crate::Message::reply).
    pub reply_diagnostics: bool,
}

impl Config {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `bus_capacity = 1024`
    /// - `invalidate_after = 60s`
    /// - `collision = CollisionPolicy::Displace`
    /// - `grace = 60s`
    /// - `reply_diagnostics = false`
    fn default() -> Self {
        Self {
            bus_capacity: 1024,
            invalidate_after: Duration::from_secs(60),
            collision: CollisionPolicy::default(),
            grace: Duration::from_secs(60),
            reply_diagnostics: false,
        }
    }
}
