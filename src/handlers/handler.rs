//! # Handler abstraction.
//!
//! A [`Handler`] is the unit of work a route points at. Each dispatch creates a
//! fresh future via [`Handler::spawn`], which receives:
//! - a [`Fiber`] context (the only way to call [`Fiber::suspend`]),
//! - the [`RoutedEvent`] that triggered it.
//!
//! The common handle type is [`HandlerRef`], an `Arc<dyn Handler>`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::core::Fiber;
use crate::error::HandlerError;
use crate::message::RoutedEvent;

/// Boxed future returned by [`Handler::spawn`].
pub type BoxHandlerFuture = Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'static>>;

/// Shared handle to a handler.
pub type HandlerRef = Arc<dyn Handler>;

/// # Asynchronous, suspendable unit of work.
///
/// # Example
/// ```
/// use fibervisor::{BoxHandlerFuture, Fiber, Handler, HandlerError, RoutedEvent, WaitOptions};
///
/// struct Confirm;
///
/// impl Handler for Confirm {
///     fn name(&self) -> &str { "confirm" }
///
///     fn spawn(&self, mut fiber: Fiber, ev: RoutedEvent) -> BoxHandlerFuture {
///         Box::pin(async move {
///             let source = ev.message().sender_scope();
///             let answer = fiber.suspend(source, "yes", WaitOptions::next_message()).await?;
///             answer.message().reply("confirmed");
///             Ok::<(), HandlerError>(())
///         })
///     }
/// }
/// ```
pub trait Handler: Send + Sync + 'static {
    /// Returns a stable, human-readable handler name.
    fn name(&self) -> &str;

    /// Creates the future for one handler execution.
    fn spawn(&self, fiber: Fiber, event: RoutedEvent) -> BoxHandlerFuture;
}
