//! # Function-backed handler (`HandlerFn`)
//!
//! [`HandlerFn`] wraps a closure `F: Fn(Fiber, RoutedEvent) -> Fut`, producing a
//! fresh future per execution. If state must be shared between executions, use
//! `Arc<...>` explicitly inside the closure.
//!
//! ## Example
//! ```rust
//! use fibervisor::{Fiber, HandlerError, HandlerFn, HandlerRef, RoutedEvent};
//!
//! let h: HandlerRef = HandlerFn::arc("hello", |_fiber: Fiber, ev: RoutedEvent| async move {
//!     ev.message().reply("hello!");
//!     Ok::<_, HandlerError>(())
//! });
//!
//! assert_eq!(h.name(), "hello");
//! ```

use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::core::Fiber;
use crate::error::HandlerError;
use crate::handlers::handler::{BoxHandlerFuture, Handler};
use crate::message::RoutedEvent;

/// Function-backed handler implementation.
pub struct HandlerFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F, Fut> HandlerFn<F>
where
    F: Fn(Fiber, RoutedEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    /// Creates a new function-backed handler.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the handler and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

impl<F> fmt::Debug for HandlerFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerFn")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Fiber, RoutedEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn spawn(&self, fiber: Fiber, event: RoutedEvent) -> BoxHandlerFuture {
        Box::pin((self.f)(fiber, event))
    }
}
