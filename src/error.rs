//! Error types used by the fibervisor runtime, fibers and handlers.
//!
//! This module defines three error enums:
//!
//! - [`WaitError`]: why a [`Fiber::suspend`](crate::Fiber::suspend) call did not deliver an event.
//! - [`HandlerError`]: errors raised by individual handler executions.
//! - [`RuntimeError`]: errors raised by the hosting dispatcher loop itself.
//!
//! All types provide helper methods (`as_label`, `as_message`) for logging/metrics.

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by the hosting dispatcher loop.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; some waits could not be released in time.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Waits (as `wait#N`) still registered when the grace period ran out.
        stuck: Vec<String>,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use fibervisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RuntimeError::GraceExceeded { grace, stuck } => {
                format!("grace exceeded after {grace:?}; stuck waits={stuck:?}")
            }
        }
    }
}

/// # Outcome of a suspension that did not deliver an event.
///
/// Returned by [`Fiber::suspend`](crate::Fiber::suspend). Only
/// [`WaitError::ProtocolMisuse`] indicates a bug in the caller; the other
/// variants mean the conversation ended without an answer.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WaitError {
    /// `suspend` was called from a root context (no enclosing fiber).
    #[error("suspend called outside of a fiber")]
    ProtocolMisuse,

    /// A timed wait elapsed without a matching event.
    #[error("wait expired after {after:?}")]
    Expired {
        /// The timeout that elapsed.
        after: Duration,
    },

    /// A next-message wait saw a non-matching message from its source.
    #[error("wait invalidated by a non-matching message")]
    Invalidated,

    /// The wait was cancelled explicitly or by dispatcher shutdown.
    #[error("wait cancelled")]
    Cancelled,
}

impl WaitError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use fibervisor::WaitError;
    ///
    /// assert_eq!(WaitError::Invalidated.as_label(), "wait_invalidated");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            WaitError::ProtocolMisuse => "protocol_misuse",
            WaitError::Expired { .. } => "wait_expired",
            WaitError::Invalidated => "wait_invalidated",
            WaitError::Cancelled => "wait_cancelled",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            WaitError::ProtocolMisuse => "suspend outside of a fiber".to_string(),
            WaitError::Expired { after } => format!("expired after {after:?}"),
            WaitError::Invalidated => "invalidated by next message".to_string(),
            WaitError::Cancelled => "cancelled".to_string(),
        }
    }

    /// Returns `true` for errors that end a conversation without fault.
    ///
    /// Everything except [`WaitError::ProtocolMisuse`].
    pub fn is_graceful(&self) -> bool {
        !matches!(self, WaitError::ProtocolMisuse)
    }
}

/// # Errors produced by handler execution.
///
/// A handler returns `Result<(), HandlerError>`. `?` on a [`WaitError`]
/// converts into [`HandlerError::Wait`].
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// Handler failed; the failure is reported and the fiber ends.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Non-recoverable error; reported as a dead fiber.
    #[error("fatal error: {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// A suspension ended without delivering an event.
    #[error(transparent)]
    Wait(#[from] WaitError),

    /// Handler panicked; the panic was caught by the fiber runner.
    #[error("handler panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },
}

impl HandlerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use fibervisor::{HandlerError, WaitError};
    ///
    /// let err: HandlerError = WaitError::Cancelled.into();
    /// assert_eq!(err.as_label(), "wait_cancelled");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            HandlerError::Fail { .. } => "handler_failed",
            HandlerError::Fatal { .. } => "handler_fatal",
            HandlerError::Wait(e) => e.as_label(),
            HandlerError::Panicked { .. } => "handler_panicked",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            HandlerError::Fail { error } => format!("error: {error}"),
            HandlerError::Fatal { error } => format!("fatal: {error}"),
            HandlerError::Wait(e) => e.as_message(),
            HandlerError::Panicked { info } => format!("panic: {info}"),
        }
    }

    /// Indicates whether the handler ended without fault.
    ///
    /// Expired, invalidated and cancelled waits are graceful: the conversation
    /// simply went nowhere.
    ///
    /// # Example
    /// ```
    /// use fibervisor::{HandlerError, WaitError};
    ///
    /// let expired: HandlerError = WaitError::Invalidated.into();
    /// assert!(expired.is_graceful());
    ///
    /// let misuse: HandlerError = WaitError::ProtocolMisuse.into();
    /// assert!(!misuse.is_graceful());
    /// ```
    pub fn is_graceful(&self) -> bool {
        match self {
            HandlerError::Wait(e) => e.is_graceful(),
            _ => false,
        }
    }

    /// Indicates whether the fiber should be reported as dead rather than failed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HandlerError::Fatal { .. }
                | HandlerError::Panicked { .. }
                | HandlerError::Wait(WaitError::ProtocolMisuse)
        )
    }
}

/// Extracts a printable message from a panic payload.
pub(crate) fn panic_message(any: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = any.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = any.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
