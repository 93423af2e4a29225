//! # LogWriter: renders runtime events through `tracing`.
//!
//! Lifecycle events go to `debug!`, anomalies to `warn!`, shutdown milestones
//! to `info!`. Install any `tracing` subscriber to see them.
//!
//! ## Example output (with `tracing_subscriber::fmt`)
//! ```text
//! DEBUG fibervisor: fiber started fiber=fiber#1 pattern="show" handler="pager"
//! DEBUG fibervisor: wait registered wait=wait#1 scope=user:alice pattern="page_to :page" policy="timed" timeout_ms=60000
//! DEBUG fibervisor: wait resumed wait=wait#1 fiber=fiber#1
//!  WARN fibervisor: stale resume wait=wait#2 reason="fiber_detached"
//!  INFO fibervisor: all waits released within grace
//! ```

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// `tracing` subscriber for runtime events.
#[derive(Default, Debug, Clone, Copy)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Renders optional ids as `-` when absent.
fn show<T: std::fmt::Display>(v: &Option<T>) -> String {
    v.as_ref().map_or_else(|| "-".to_string(), ToString::to_string)
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let wait = show(&e.wait);
        let fiber = show(&e.fiber);
        let scope = show(&e.scope);
        let pattern = e.pattern.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("-");

        match e.kind {
            EventKind::FiberStarted => {
                debug!(target: "fibervisor", %fiber, pattern, handler = reason, "fiber started")
            }
            EventKind::FiberParked => debug!(target: "fibervisor", %fiber, %wait, "fiber parked"),
            EventKind::FiberStopped => debug!(target: "fibervisor", %fiber, reason, "fiber stopped"),
            EventKind::FiberFailed => warn!(target: "fibervisor", %fiber, reason, "fiber failed"),
            EventKind::FiberDead => warn!(target: "fibervisor", %fiber, reason, "fiber dead"),

            EventKind::WaitRegistered => debug!(
                target: "fibervisor",
                %wait, %scope, pattern, policy = reason, timeout_ms = ?e.timeout_ms,
                "wait registered"
            ),
            EventKind::WaitDisplaced => {
                debug!(target: "fibervisor", %wait, %scope, pattern, reason, "wait displaced")
            }
            EventKind::WaitResumed => debug!(target: "fibervisor", %wait, %fiber, "wait resumed"),
            EventKind::WaitExpired => {
                debug!(target: "fibervisor", %wait, %fiber, timeout_ms = ?e.timeout_ms, "wait expired")
            }
            EventKind::WaitInvalidated => {
                debug!(target: "fibervisor", %wait, %fiber, "wait invalidated")
            }
            EventKind::WaitCancelled => debug!(target: "fibervisor", %wait, %fiber, "wait cancelled"),
            EventKind::NoPendingWait => {
                debug!(target: "fibervisor", %scope, pattern, "no pending wait")
            }
            EventKind::StaleResume => warn!(target: "fibervisor", %wait, reason, "stale resume"),
            EventKind::ProtocolMisuse => {
                warn!(target: "fibervisor", %scope, pattern, "suspend called outside a fiber")
            }

            EventKind::PatternBound => debug!(target: "fibervisor", pattern, "resume rule bound"),
            EventKind::PatternUnbound => {
                debug!(target: "fibervisor", pattern, "resume rule unbound")
            }
            EventKind::MessageUnrouted => debug!(target: "fibervisor", %scope, "message unrouted"),

            EventKind::ShutdownRequested => info!(target: "fibervisor", reason, "shutdown requested"),
            EventKind::AllStoppedWithin => {
                info!(target: "fibervisor", "all waits released within grace")
            }
            EventKind::GraceExceeded => warn!(target: "fibervisor", "grace exceeded"),
            EventKind::SubscriberPanicked | EventKind::SubscriberOverflow => {
                warn!(target: "fibervisor", reason, "subscriber anomaly")
            }
        }
    }

    fn name(&self) -> &'static str {
        "log_writer"
    }
}
