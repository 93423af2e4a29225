//! Runtime core: fibers, pending waits and the dispatch stream.
//!
//! The only entry point from this module is [`Dispatcher`], which routes
//! messages, runs handlers in fibers and resumes them when the message they
//! wait for arrives.
//!
//! Internal modules:
//! - [`dispatcher`]: the dispatch turn, handler execution and shutdown;
//! - [`fiber`]: fiber contexts, `suspend`, and the baton hand-off;
//! - [`continuation`]: the resumable half of a suspension;
//! - [`registry`]: pending waits keyed by (scope, pattern);
//! - [`binder`]: reference-counted resume rules in the router;
//! - [`resume`]: routed event → pending wait → parked fiber;
//! - [`invalidation`]: timed expiry and next-message invalidation;
//! - [`shutdown`]: OS termination signals for the run loop.

mod binder;
mod builder;
mod config;
mod continuation;
mod dispatcher;
mod fiber;
mod invalidation;
mod registry;
mod resume;
mod shutdown;

pub use builder::DispatcherBuilder;
pub use config::Config;
pub use continuation::ContinuationState;
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use fiber::{Fiber, FiberStatus};
pub use registry::WaitInfo;
