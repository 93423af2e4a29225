//! Wait policies.
//!
//! This module groups the knobs that control **how** a pending wait ends and
//! **what happens** when two waits want the same pattern.
//!
//! ## Contents
//! - [`InvalidatePolicy`] timed expiry or next-message invalidation
//! - [`WaitOptions`]      policy plus optional explicit timeout, passed to `suspend`
//! - [`CollisionPolicy`]  displace or coexist on a shared pattern
//!
//! ## Quick wiring
//! ```text
//! Fiber::suspend(scope, pattern, WaitOptions { invalidate, timeout })
//!      └─► WaitRegistry::insert (CollisionPolicy from Config)
//!      └─► invalidation::arm (Timed) / invalidation::on_message (NextMessage)
//! ```

mod collision;
mod invalidate;

pub use collision::CollisionPolicy;
pub use invalidate::{InvalidatePolicy, WaitOptions};
