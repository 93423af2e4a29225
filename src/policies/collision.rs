//! # Collision policy for waits sharing a pattern.
//!
//! All waits on one pattern share a single resume rule in the router, so two
//! conversations waiting for the same literal pattern collide:
//!
//! ```text
//! <user-a> flights tokyo nyc      → wait (user-a, "more")
//! <user-b> bookings               → wait (user-b, "more")
//! <user-a> more                   → ?
//! ```
//!
//! - [`CollisionPolicy::Displace`] at most one wait per pattern; the newer wait
//!   evicts the older one, whose continuation stays parked (default).
//! - [`CollisionPolicy::Coexist`] waits are keyed by (scope, pattern); only a wait
//!   with the identical key is evicted, the rule is reference-counted.

/// How a new wait treats existing waits on the same pattern.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CollisionPolicy {
    /// One wait per pattern, system-wide (default).
    #[default]
    Displace,
    /// One wait per (scope, pattern).
    Coexist,
}
