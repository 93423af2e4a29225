//! # fibervisor
//!
//! **Fibervisor** lets a message handler stop half-way, wait for a later
//! message from the same user or channel, and continue where it left off.
//!
//! A handler routed as a *fiber* gets a [`Fiber`] context. Calling
//! [`Fiber::suspend`] registers a pending wait for `(scope, pattern)`, installs
//! a resume rule for the pattern in the router, and parks the handler. When a
//! matching message arrives from that scope, the handler resumes with the
//! routed event as the return value of `suspend`.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!                      Message (sender, channel?, text)
//!                                   │
//!                                   ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Dispatcher (single dispatch stream, one turn at a time)          │
//! │  - PatternRouter (routes text → handler rule | resume rule)       │
//! │  - WaitRegistry  (pending waits keyed by scope + pattern)         │
//! │  - PatternBinder (ref-counted resume rules)                       │
//! │  - Bus           (broadcast events)                               │
//! └──────┬──────────────────────┬───────────────────────┬─────────────┘
//!        │ handler rule         │ resume rule           │ timer / next message
//!        ▼                      ▼                       ▼
//!  ┌────────────┐        ┌──────────────┐        ┌──────────────┐
//!  │ fiber task │ ◄──────│ resume path  │        │ invalidation │
//!  │ (handler)  │ resume │ take wait,   │        │ Expired /    │
//!  │ suspend()──┼──park─►│ deliver evt  │        │ Invalidated  │
//!  └────────────┘        └──────────────┘        └──────────────┘
//!        │                      │                       │
//!        └──────────── publish(Event) ──────────────────┘
//!                               ▼
//!                      Bus ──► SubscriberSet ──► LogWriter, custom subscribers
//! ```
//!
//! ### Lifecycle of one conversation
//! ```text
//! <alice> show            → pager fiber starts, shows page 1
//!                           fiber.suspend(user:alice, "page_to :page")
//!                             ├─ WaitRegistered, PatternBound
//!                             └─ FiberParked (dispatch returns)
//! <bob>   page_to 2       → resume rule matches, no wait for user:bob → NoPendingWait
//! <alice> page_to 2       → wait taken, PatternUnbound, WaitResumed
//!                           suspend returns Ok(event{page: "2"})
//!                           fiber shows page 2, returns → FiberStopped
//! ```
//!
//! ## Features
//! | Area              | Description                                                        | Key types                                |
//! |-------------------|--------------------------------------------------------------------|------------------------------------------|
//! | **Suspension**    | Park a handler until a matching message arrives from a scope       | [`Fiber`], [`WaitOptions`], [`Scope`]    |
//! | **Invalidation**  | Timed expiry or next-message invalidation of pending waits         | [`InvalidatePolicy`], [`WaitError`]      |
//! | **Collisions**    | Displace or coexist when waits share a pattern                     | [`CollisionPolicy`]                      |
//! | **Routing**       | Pluggable router seam plus a `:param` template router              | [`PatternRouter`], [`TemplateRouter`]    |
//! | **Observability** | Broadcast events fanned out to subscribers                         | [`Event`], [`EventKind`], [`Subscribe`]  |
//! | **Shutdown**      | Signals, inbox close or `close()`; waits released within grace     | [`Dispatcher::run`], [`Config`]          |
//!
//! ## Optional features
//! - `logging`: exports [`LogWriter`], rendering events through `tracing`.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use fibervisor::{
//!     Dispatcher, DispatchOutcome, Fiber, HandlerError, HandlerFn, Message, RouteOptions,
//!     RoutedEvent, TemplateRouter, WaitOptions,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let router = Arc::new(TemplateRouter::new());
//!     let pager = HandlerFn::arc("pager", |mut fiber: Fiber, ev: RoutedEvent| async move {
//!         let source = ev.message().sender_scope();
//!         let next = fiber.suspend(source, "page_to :page", WaitOptions::default()).await?;
//!         next.message().reply(&format!("page {}", next.param("page").unwrap_or("?")));
//!         Ok::<(), HandlerError>(())
//!     });
//!     router.map("show", pager, RouteOptions::fiber());
//!
//!     let dispatcher = Dispatcher::builder(router).build();
//!     dispatcher.dispatch(Message::new("alice", "show")).await;
//!     assert_eq!(dispatcher.pending_len(), 1);
//!
//!     let out = dispatcher.dispatch(Message::new("alice", "page_to 2")).await;
//!     assert!(matches!(out, DispatchOutcome::Resumed { .. }));
//!     assert_eq!(dispatcher.pending_len(), 0);
//! }
//! ```

mod core;
mod error;
mod events;
mod handlers;
mod ids;
mod message;
mod policies;
mod routing;
mod subscribers;

// ---- Public re-exports ----

pub use crate::core::{
    Config, ContinuationState, DispatchOutcome, Dispatcher, DispatcherBuilder, Fiber, FiberStatus,
    WaitInfo,
};
pub use error::{HandlerError, RuntimeError, WaitError};
pub use events::{Event, EventKind};
pub use handlers::{BoxHandlerFuture, Handler, HandlerFn, HandlerRef};
pub use ids::{FiberId, WaitId};
pub use message::{Message, Params, Reply, RoutedEvent, Scope};
pub use policies::{CollisionPolicy, InvalidatePolicy, WaitOptions};
pub use routing::{PatternRouter, RouteMatch, RouteOptions, RouteTarget, TemplateRouter};
pub use subscribers::Subscribe;

// Optional: expose a built-in `tracing` subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
