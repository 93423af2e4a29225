//! # Handler abstractions.
//!
//! - [`Handler`] - trait for suspendable async handlers
//! - [`HandlerFn`] - function-backed handler implementation
//! - [`HandlerRef`] - shared reference to a handler (`Arc<dyn Handler>`)

mod handler;
mod handler_fn;

pub use handler::{BoxHandlerFuture, Handler, HandlerRef};
pub use handler_fn::HandlerFn;
