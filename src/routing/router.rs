//! # Routing engine interface.
//!
//! The pattern-matching engine that decides which route a raw message takes
//! lives outside the continuation core. [`PatternRouter`] is the seam: the core
//! installs and removes resume rules through it, and the dispatcher asks it to
//! route each incoming message.

use std::fmt;
use std::sync::Arc;

use crate::handlers::HandlerRef;
use crate::message::Params;

/// What a routing rule points at.
#[derive(Clone)]
pub enum RouteTarget {
    /// The Resume Dispatcher: the message answers a pending wait.
    Resume,
    /// A regular handler.
    Handler(HandlerRef),
}

impl fmt::Debug for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteTarget::Resume => f.write_str("Resume"),
            RouteTarget::Handler(h) => f.debug_tuple("Handler").field(&h.name()).finish(),
        }
    }
}

/// Execution mode of a routing rule.
///
/// - `fiber`: run the handler inside a new fiber, so it may `suspend`.
/// - `threaded`: run the handler detached from the dispatch stream.
///
/// Both off: the handler runs inline in the root context. Resume rules are
/// always registered with both off ([`RouteOptions::resume`]).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RouteOptions {
    pub fiber: bool,
    pub threaded: bool,
}

impl RouteOptions {
    /// Fiber-backed handler route.
    pub fn fiber() -> Self {
        Self {
            fiber: true,
            threaded: false,
        }
    }

    /// Detached handler route.
    pub fn threaded() -> Self {
        Self {
            fiber: false,
            threaded: true,
        }
    }

    /// Options for resume rules: no nested fiber, no detached worker.
    pub fn resume() -> Self {
        Self::default()
    }
}

/// Result of routing one message.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    /// Pattern id of the matched rule.
    pub pattern: Arc<str>,
    pub target: RouteTarget,
    pub options: RouteOptions,
    /// Parameters extracted from the message text.
    pub params: Params,
}

/// Routing engine consumed by the dispatcher.
///
/// Implementations must be cheap and non-blocking: every method is called
/// while the dispatch turn is held.
pub trait PatternRouter: Send + Sync + 'static {
    /// Installs (or replaces) the rule for `pattern`.
    fn register_pattern(&self, pattern: &str, target: RouteTarget, options: RouteOptions);

    /// Removes the rule for `pattern`; returns `false` if there was none.
    fn unregister_pattern(&self, pattern: &str) -> bool;

    /// Returns `true` if a rule for `pattern` is installed.
    fn has_pattern(&self, pattern: &str) -> bool;

    /// Routes a message text to the first matching rule.
    fn route(&self, text: &str) -> Option<RouteMatch>;
}
