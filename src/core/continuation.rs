//! # Continuation: a parked fiber that can be resumed exactly once.
//!
//! A [`Continuation`] is the registry-side half of a suspension. The fiber side
//! awaits a single-slot `oneshot` channel; the continuation owns the sender.
//!
//! ```text
//! Fiber::suspend ──► Continuation { tx } ──► PendingWait ──► WaitRegistry
//!        │                                                      │
//!        └──── awaits rx ◄──── Resumption { outcome, baton } ◄──┘ (resume)
//! ```
//!
//! The [`Resumption`] also carries a fresh baton: the resumer awaits it to learn
//! when the fiber parks again or finishes, which is what makes resuming a
//! synchronous transfer of control.
//!
//! ## Rules
//! - `resume` consumes the sender, so a continuation can never deliver twice
//! - state moves `Suspended → Resumed | Invalidated` and never back
//! - a fiber whose task is gone (receiver dropped) is reported as detached

use std::time::Duration;

use tokio::sync::oneshot;

use crate::core::fiber::{Baton, FiberStatus};
use crate::error::WaitError;
use crate::ids::FiberId;
use crate::message::RoutedEvent;

/// Lifecycle state of a continuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuationState {
    /// Parked, waiting for a resume.
    Suspended,
    /// Resumed with a delivered event (terminal).
    Resumed,
    /// Released without an event: expired, invalidated or cancelled (terminal).
    Invalidated,
}

impl ContinuationState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ContinuationState::Suspended)
    }
}

/// What a parked fiber is resumed with.
#[derive(Debug)]
pub(crate) enum Resume {
    Delivered(RoutedEvent),
    Expired { after: Duration },
    Invalidated,
    Cancelled,
}

impl Resume {
    fn terminal_state(&self) -> ContinuationState {
        match self {
            Resume::Delivered(_) => ContinuationState::Resumed,
            _ => ContinuationState::Invalidated,
        }
    }

    pub(crate) fn into_result(self) -> Result<RoutedEvent, WaitError> {
        match self {
            Resume::Delivered(ev) => Ok(ev),
            Resume::Expired { after } => Err(WaitError::Expired { after }),
            Resume::Invalidated => Err(WaitError::Invalidated),
            Resume::Cancelled => Err(WaitError::Cancelled),
        }
    }
}

/// Payload handed to a parked fiber.
pub(crate) struct Resumption {
    pub(crate) outcome: Resume,
    /// Baton for the segment the fiber runs next.
    pub(crate) baton: Baton,
}

/// Why a continuation could not be resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResumeRejected {
    /// Already resumed or invalidated.
    Terminal(ContinuationState),
    /// The fiber's task is gone.
    Detached,
}

impl ResumeRejected {
    pub(crate) fn as_label(&self) -> &'static str {
        match self {
            ResumeRejected::Terminal(_) => "continuation_terminal",
            ResumeRejected::Detached => "fiber_detached",
        }
    }
}

/// Registry-side handle of a parked fiber.
#[derive(Debug)]
pub(crate) struct Continuation {
    fiber: FiberId,
    tx: Option<oneshot::Sender<Resumption>>,
    state: ContinuationState,
}

impl Continuation {
    pub(crate) fn new(fiber: FiberId, tx: oneshot::Sender<Resumption>) -> Self {
        Self {
            fiber,
            tx: Some(tx),
            state: ContinuationState::Suspended,
        }
    }

    pub(crate) fn fiber(&self) -> FiberId {
        self.fiber
    }

    pub(crate) fn state(&self) -> ContinuationState {
        self.state
    }

    /// Resumes the fiber; returns the receiver of its next status.
    pub(crate) fn resume(
        &mut self,
        outcome: Resume,
    ) -> Result<oneshot::Receiver<FiberStatus>, ResumeRejected> {
        if self.state.is_terminal() {
            return Err(ResumeRejected::Terminal(self.state));
        }
        let tx = self
            .tx
            .take()
            .ok_or(ResumeRejected::Terminal(self.state))?;
        self.state = outcome.terminal_state();

        let (baton, status_rx) = oneshot::channel();
        tx.send(Resumption { outcome, baton })
            .map_err(|_| ResumeRejected::Detached)?;
        Ok(status_rx)
    }
}

impl std::fmt::Debug for Resumption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resumption")
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}
