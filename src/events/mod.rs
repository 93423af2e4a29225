//! Observable runtime transitions.
//!
//! [`Event`] records one transition (a wait parked, a fiber resumed, a rule
//! unbound) tagged with an [`EventKind`], a global sequence number and whichever
//! wait, fiber, scope or pattern it concerns. [`Bus`] broadcasts them.
//!
//! Nothing in the runtime reads events back to make decisions; they exist for
//! subscribers and for callers of `Dispatcher::subscribe()`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
