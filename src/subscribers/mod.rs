//! # Event subscribers for the fibervisor runtime.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out,
//! and (with the `logging` feature) the [`LogWriter`] built-in.
//!
//! ## Architecture
//! ```text
//! Core ── publish(Event) ──► Bus ──► subscriber_listener ──► SubscriberSet::emit
//!                                                                 │
//!                                                   ┌─────────────┼─────────────┐
//!                                                   ▼             ▼             ▼
//!                                               LogWriter      Metrics        Custom
//! ```
//!
//! Subscribers are passive: they observe fibers and waits but never take part
//! in a resume, so a slow or failing subscriber cannot stall a conversation.

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscriber;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub(crate) use set::SubscriberSet;
pub use subscriber::Subscribe;
