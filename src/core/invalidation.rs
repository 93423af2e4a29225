//! # Wait invalidation: timed expiry and next-message invalidation.
//!
//! ```text
//! Timed:        suspend ──► arm(timer) ──sleep(after)──► expire(wait) ──► Err(Expired)
//!                                └── disarmed on resume/displace/cancel ──► no-op
//!
//! NextMessage:  dispatch/resume/observe(msg from S) ──► on_message ──► every
//!               NextMessage wait on S that msg did not resume ──► Err(Invalidated)
//! ```
//!
//! ## Rules
//! - expiry takes the dispatch turn, so it is serialized with dispatch and resume
//! - a timer that lost the race finds nothing in the registry and does nothing
//! - next-message invalidation runs before the routed message is acted on; a
//!   wait the message answers is taken out of the registry first, so it is the
//!   only one of its scopes' next-message waits that survives

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::core::continuation::Resume;
use crate::core::dispatcher::Core;
use crate::events::EventKind;
use crate::ids::WaitId;
use crate::message::Message;

/// Spawns the expiry timer of wait `id`.
pub(crate) fn arm(core: &Arc<Core>, id: WaitId, after: Duration, token: CancellationToken) {
    let weak = Arc::downgrade(core);
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = time::sleep(after) => {
                if let Some(core) = weak.upgrade() {
                    expire(&core, id, after).await;
                }
            }
        }
    });
}

async fn expire(core: &Core, id: WaitId, after: Duration) {
    let _turn = core.turn().await;
    let Some(wait) = core.registry().take(id) else {
        return;
    };
    core.retire(&wait);
    core.release(wait, Resume::Expired { after }, EventKind::WaitExpired)
        .await;
}

/// Invalidates next-message waits on `message`'s scopes; runs under the turn.
///
/// Returns how many waits were invalidated.
pub(crate) async fn on_message(core: &Core, message: &Message) -> usize {
    let stale = core.registry().take_next_message(&message.scopes());
    let count = stale.len();
    for wait in stale {
        core.retire(&wait);
        core.release(wait, Resume::Invalidated, EventKind::WaitInvalidated)
            .await;
    }
    count
}
