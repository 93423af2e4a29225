//! # Dispatcher: the single dispatch stream that drives fibers.
//!
//! The [`Dispatcher`] owns the wait registry, the pattern binder and the event
//! bus, and serializes every state transition behind one *turn*.
//!
//! ## Architecture
//! ```text
//! dispatch(Message)
//!   └─ turn.lock()
//!        ├─ router.route(text) ─────────────────────────────► RouteMatch?
//!        └─ match target:
//!             ├─ none                  ──► on_message, MessageUnrouted
//!             ├─ Resume                ──► resume::on_routed_event ──► parked fiber
//!             │                             (take answered wait, on_message, resume)
//!             ├─ Handler (any)         ──► on_message (NextMessage waits), then:
//!             ├─ Handler { fiber }     ──► fiber::start  (drive until park/finish)
//!             ├─ Handler { threaded }  ──► fiber::detach (root context, own task)
//!             └─ Handler               ──► fiber::run_root (inline)
//!
//! timers ── invalidation::arm ──► expire(wait) ──► turn.lock() ──► Err(Expired)
//!
//! Event flow:
//!   Core ── publish(Event) ──► Bus ──► subscriber_listener ──► SubscriberSet::emit(&Event)
//!
//! Shutdown path (run):
//!   OS signal | close() | inbox closed
//!        └─► Bus.publish(ShutdownRequested)
//!        └─► timeout(grace, release_all):
//!               ├─ Ok        → Bus.publish(AllStoppedWithin)
//!               └─ Timeout   → Bus.publish(GraceExceeded) → RuntimeError::GraceExceeded
//! ```
//!
//! ## Rules
//! - at most one fiber segment runs at a time; resumes, expiries, cancels and
//!   dispatches are totally ordered by the turn
//! - a handler must not call back into `dispatch`/`resume`/`cancel` on the same
//!   dispatcher while it holds the turn (fiber or inline routes); detached
//!   (`threaded`) handlers may
//! - dropping the dispatcher releases every parked fiber with
//!   [`WaitError::Cancelled`](crate::WaitError::Cancelled)

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::{MutexGuard, broadcast, mpsc, oneshot};
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::core::binder::PatternBinder;
use crate::core::builder::DispatcherBuilder;
use crate::core::config::Config;
use crate::core::continuation::{Resume, ResumeRejected};
use crate::core::fiber::{self, Fiber, FiberStatus};
use crate::core::registry::{PendingWait, WaitInfo, WaitRegistry};
use crate::core::{invalidation, resume, shutdown};
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::handlers::HandlerRef;
use crate::ids::{FiberId, WaitId};
use crate::message::{Message, RoutedEvent};
use crate::routing::{PatternRouter, RouteMatch, RouteOptions, RouteTarget};
use crate::subscribers::SubscriberSet;

/// What one `dispatch`/`resume` call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No route matched the message.
    Unrouted,
    /// A handler ran (in a fiber, or inline on the root context).
    Handled { fiber: FiberId, status: FiberStatus },
    /// A `threaded` handler was started in its own task.
    Detached,
    /// A pending wait was resumed.
    Resumed {
        wait: WaitId,
        fiber: FiberId,
        status: FiberStatus,
    },
    /// The event answered no pending wait.
    NoPendingWait,
    /// A pending wait was found but its fiber could not be resumed.
    StaleResume { wait: WaitId },
    /// The dispatcher is shut down.
    Closed,
}

/// Shared state behind the dispatcher; fibers and timers hold it weakly.
pub(crate) struct Core {
    cfg: Config,
    bus: Bus,
    router: Arc<dyn PatternRouter>,
    registry: WaitRegistry,
    binder: PatternBinder,
    turn: tokio::sync::Mutex<()>,
    runtime_token: CancellationToken,
    closed: AtomicBool,
}

impl Core {
    pub(crate) fn new(cfg: Config, bus: Bus, router: Arc<dyn PatternRouter>) -> Self {
        Self {
            registry: WaitRegistry::new(cfg.collision),
            binder: PatternBinder::new(Arc::clone(&router), bus.clone()),
            turn: tokio::sync::Mutex::new(()),
            runtime_token: CancellationToken::new(),
            closed: AtomicBool::new(false),
            cfg,
            bus,
            router,
        }
    }

    pub(crate) fn config(&self) -> &Config {
        &self.cfg
    }

    pub(crate) fn registry(&self) -> &WaitRegistry {
        &self.registry
    }

    pub(crate) fn publish(&self, ev: Event) {
        self.bus.publish(ev);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) async fn turn(&self) -> MutexGuard<'_, ()> {
        self.turn.lock().await
    }

    /// Fresh expiry timer token; cancelled on shutdown.
    pub(crate) fn timer_token(&self) -> CancellationToken {
        self.runtime_token.child_token()
    }

    /// Registers a wait and binds its pattern; releases what it displaced.
    pub(crate) fn park(&self, wait: PendingWait) {
        let registered = wait
            .event(EventKind::WaitRegistered)
            .with_reason(wait.invalidate.as_label());
        let registered = match wait.timeout {
            Some(t) => registered.with_timeout(t),
            None => registered,
        };
        let (id, pattern) = (wait.id, Arc::clone(&wait.key.pattern));

        let displaced = self.registry.insert(wait);
        self.binder.acquire(&pattern);
        self.publish(registered);

        let parked = self.registry.displaced_len();
        for old in displaced {
            self.binder.release(&old.pattern);
            self.publish(
                Event::new(EventKind::WaitDisplaced)
                    .with_wait(old.id)
                    .with_fiber(old.fiber)
                    .with_pattern(old.pattern)
                    .with_scope(old.scope)
                    .with_reason(format!("by {id} displaced={parked}")),
            );
        }
    }

    /// Detaches an active wait from its timer and its resume rule.
    pub(crate) fn retire(&self, wait: &PendingWait) {
        wait.disarm();
        self.binder.release(&wait.key.pattern);
    }

    /// Ends `wait` without an event and drives its fiber.
    pub(crate) async fn release(
        &self,
        mut wait: PendingWait,
        outcome: Resume,
        kind: EventKind,
    ) -> Option<FiberStatus> {
        let mut ev = wait.event(kind);
        if let (EventKind::WaitExpired, Some(t)) = (kind, wait.timeout) {
            ev = ev.with_timeout(t);
        }

        match wait.continuation.resume(outcome) {
            Ok(status_rx) => {
                self.publish(ev);
                Some(self.drive(wait.fiber(), status_rx).await)
            }
            Err(rejected) => {
                self.stale(&wait, rejected);
                None
            }
        }
    }

    pub(crate) fn stale(&self, wait: &PendingWait, rejected: ResumeRejected) {
        self.publish(
            wait.event(EventKind::StaleResume)
                .with_reason(rejected.as_label()),
        );
    }

    /// Replies `text` to `message` when diagnostics are enabled.
    pub(crate) fn diagnose(&self, message: &Message, text: &str) {
        if self.cfg.reply_diagnostics {
            message.reply(text);
        }
    }

    /// Awaits the fiber's baton and reports what it said.
    pub(crate) async fn drive(
        &self,
        fiber: FiberId,
        status_rx: oneshot::Receiver<FiberStatus>,
    ) -> FiberStatus {
        let status = status_rx.await.unwrap_or(FiberStatus::Lost);
        self.report(fiber, &status);
        status
    }

    pub(crate) fn report(&self, fiber: FiberId, status: &FiberStatus) {
        let ev = match status {
            FiberStatus::Parked(wait) => Event::new(EventKind::FiberParked).with_wait(*wait),
            FiberStatus::Finished(Ok(())) => Event::new(EventKind::FiberStopped),
            FiberStatus::Finished(Err(e)) if e.is_graceful() => {
                Event::new(EventKind::FiberStopped).with_reason(e.as_label())
            }
            FiberStatus::Finished(Err(e)) if e.is_fatal() => {
                Event::new(EventKind::FiberDead).with_reason(e.as_message())
            }
            FiberStatus::Finished(Err(e)) => {
                Event::new(EventKind::FiberFailed).with_reason(e.as_message())
            }
            FiberStatus::Lost => Event::new(EventKind::FiberDead).with_reason("fiber_lost"),
        };
        self.publish(ev.with_fiber(fiber));
    }
}

impl Drop for Core {
    fn drop(&mut self) {
        self.runtime_token.cancel();
    }
}

/// Routes messages to handlers and resumes suspended fibers.
pub struct Dispatcher {
    core: Arc<Core>,
    subs: Arc<SubscriberSet>,
    stop: CancellationToken,
}

impl Dispatcher {
    /// Returns a builder over `router`.
    pub fn builder(router: Arc<dyn PatternRouter>) -> DispatcherBuilder {
        DispatcherBuilder::new(router)
    }

    pub(crate) fn new_internal(core: Arc<Core>, subs: Arc<SubscriberSet>) -> Self {
        Self {
            core,
            subs,
            stop: CancellationToken::new(),
        }
    }

    /// Routes one message and acts on the match.
    pub async fn dispatch(&self, message: Message) -> DispatchOutcome {
        let _turn = self.core.turn().await;
        if self.core.is_closed() {
            return DispatchOutcome::Closed;
        }

        let Some(RouteMatch {
            pattern,
            target,
            options,
            params,
        }) = self.core.router.route(message.text())
        else {
            invalidation::on_message(&self.core, &message).await;
            self.core.publish(
                Event::new(EventKind::MessageUnrouted).with_scope(message.sender_scope()),
            );
            return DispatchOutcome::Unrouted;
        };

        let event = RoutedEvent::new(message, pattern, params);
        match target {
            // Sweeps next-message waits itself, once it knows which wait is answered.
            RouteTarget::Resume => resume::on_routed_event(&self.core, event).await,
            RouteTarget::Handler(handler) => {
                invalidation::on_message(&self.core, event.message()).await;
                self.run_handler(handler, options, event).await
            }
        }
    }

    async fn run_handler(
        &self,
        handler: HandlerRef,
        options: RouteOptions,
        event: RoutedEvent,
    ) -> DispatchOutcome {
        if options.fiber {
            let (fiber, status) = fiber::start(&self.core, handler, event).await;
            DispatchOutcome::Handled { fiber, status }
        } else if options.threaded {
            fiber::detach(&self.core, handler, event);
            DispatchOutcome::Detached
        } else {
            let status = fiber::run_root(&self.core, handler, event).await;
            DispatchOutcome::Handled {
                fiber: FiberId::ROOT,
                status,
            }
        }
    }

    /// Resumes the wait an already-routed event answers.
    ///
    /// This is the entry point resume rules lead to; `dispatch` calls it for
    /// every message routed to [`RouteTarget::Resume`]. Next-message waits on
    /// the event's scopes that it does not answer are invalidated, as they
    /// would be by `dispatch`.
    pub async fn resume(&self, event: RoutedEvent) -> DispatchOutcome {
        let _turn = self.core.turn().await;
        if self.core.is_closed() {
            return DispatchOutcome::Closed;
        }
        resume::on_routed_event(&self.core, event).await
    }

    /// Lets a message that routed nowhere near the resume path end the
    /// next-message waits of its sender and channel.
    ///
    /// Hosts with their own routing loop call this for every message they do
    /// not pass to [`Dispatcher::resume`]. Returns how many waits ended.
    pub async fn observe(&self, message: &Message) -> usize {
        let _turn = self.core.turn().await;
        if self.core.is_closed() {
            return 0;
        }
        invalidation::on_message(&self.core, message).await
    }

    /// Cancels a pending (or displaced) wait; its fiber sees `Cancelled`.
    ///
    /// Returns `false` if no such wait exists.
    pub async fn cancel(&self, id: WaitId) -> bool {
        let _turn = self.core.turn().await;
        if let Some(wait) = self.core.registry.take(id) {
            self.core.retire(&wait);
            self.core
                .release(wait, Resume::Cancelled, EventKind::WaitCancelled)
                .await;
            true
        } else if let Some(wait) = self.core.registry.take_displaced(id) {
            self.core
                .release(wait, Resume::Cancelled, EventKind::WaitCancelled)
                .await;
            true
        } else {
            false
        }
    }

    /// Closes the dispatcher and releases every wait with `Cancelled`.
    ///
    /// Later dispatches return [`DispatchOutcome::Closed`]; fibers that try to
    /// suspend again fail immediately with `Cancelled`.
    pub async fn shutdown(&self) {
        self.release_all(&Mutex::new(Vec::new())).await;
    }

    async fn release_all(&self, remaining: &Mutex<Vec<WaitId>>) {
        let _turn = self.core.turn().await;
        if self.core.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.core.runtime_token.cancel();

        let (active, displaced) = self.core.registry.drain();
        *remaining.lock() = active.iter().chain(&displaced).map(|w| w.id).collect();

        for wait in active {
            let id = wait.id;
            self.core.retire(&wait);
            self.core
                .release(wait, Resume::Cancelled, EventKind::WaitCancelled)
                .await;
            remaining.lock().retain(|w| *w != id);
        }
        for wait in displaced {
            let id = wait.id;
            self.core
                .release(wait, Resume::Cancelled, EventKind::WaitCancelled)
                .await;
            remaining.lock().retain(|w| *w != id);
        }
    }

    /// Dispatches messages from `inbox` until shutdown.
    ///
    /// Stops on an OS termination signal, on [`close`](Self::close), or when the
    /// inbox is closed; then releases all waits within `Config::grace`.
    ///
    /// # Errors
    /// [`RuntimeError::GraceExceeded`] if waits could not be released in time.
    pub async fn run(&self, mut inbox: mpsc::Receiver<Message>) -> Result<(), RuntimeError> {
        let signal = shutdown::wait_for_shutdown_signal();
        tokio::pin!(signal);
        let mut signals = true;

        let reason = loop {
            tokio::select! {
                res = &mut signal, if signals => match res {
                    Ok(sig) => break sig.as_label(),
                    Err(_) => signals = false,
                },
                _ = self.stop.cancelled() => break "closed",
                msg = inbox.recv() => match msg {
                    Some(message) => {
                        self.dispatch(message).await;
                    }
                    None => break "inbox_closed",
                },
            }
        };

        self.core
            .publish(Event::new(EventKind::ShutdownRequested).with_reason(reason));
        self.shutdown_with_grace().await
    }

    /// Asks a running [`run`](Self::run) loop to stop.
    pub fn close(&self) {
        self.stop.cancel();
    }

    async fn shutdown_with_grace(&self) -> Result<(), RuntimeError> {
        let grace = self.core.cfg.grace;
        let remaining = Mutex::new(Vec::new());

        match time::timeout(grace, self.release_all(&remaining)).await {
            Ok(()) => {
                self.core.publish(Event::new(EventKind::AllStoppedWithin));
                Ok(())
            }
            Err(_) => {
                self.core.publish(Event::new(EventKind::GraceExceeded));
                let mut stuck: Vec<String> =
                    remaining.lock().iter().map(ToString::to_string).collect();
                if stuck.is_empty() {
                    stuck = self.pending().iter().map(|w| w.id.to_string()).collect();
                }
                Err(RuntimeError::GraceExceeded { grace, stuck })
            }
        }
    }

    /// Active waits ordered by id.
    pub fn pending(&self) -> Vec<WaitInfo> {
        self.core.registry.snapshot()
    }

    pub fn pending_len(&self) -> usize {
        self.core.registry.len()
    }

    /// Waits evicted by a newer wait and still parked.
    ///
    /// Displaced waits have no timer and no resume rule, so nothing but
    /// [`Dispatcher::cancel`], [`Dispatcher::shutdown`] or dropping the
    /// dispatcher ever releases them. Under [`CollisionPolicy::Displace`] every
    /// collision adds one; a long-running host should watch this number (it is
    /// also carried on every `WaitDisplaced` event) and cancel what it no longer
    /// needs.
    ///
    /// [`CollisionPolicy::Displace`]: crate::CollisionPolicy::Displace
    pub fn displaced_len(&self) -> usize {
        self.core.registry.displaced_len()
    }

    /// Returns `true` while a resume rule installed for waits on `pattern` is live.
    pub fn is_bound(&self, pattern: &str) -> bool {
        self.core.binder.is_bound(pattern)
    }

    /// Number of pending waits referencing `pattern`.
    pub fn pattern_refs(&self, pattern: &str) -> usize {
        self.core.binder.refs(pattern)
    }

    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    /// Subscribes to runtime events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.core.bus.subscribe()
    }

    /// The root (non-suspendable) context.
    pub fn root_fiber(&self) -> Fiber {
        Fiber::root(Arc::downgrade(&self.core))
    }

    pub fn config(&self) -> &Config {
        &self.core.cfg
    }

    /// Forwards bus events to the subscriber set (fire-and-forget).
    pub(crate) fn subscriber_listener(bus: &Bus, subs: Weak<SubscriberSet>) {
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => match subs.upgrade() {
                        Some(set) => set.emit(&ev),
                        None => break,
                    },
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pending", &self.pending_len())
            .field("displaced", &self.displaced_len())
            .field("subscribers", &self.subs.len())
            .field("observers", &self.core.bus.observers())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::{HandlerError, WaitError};
    use crate::handlers::HandlerFn;
    use crate::message::{Params, Reply, Scope};
    use crate::policies::{CollisionPolicy, WaitOptions};
    use crate::routing::TemplateRouter;

    type Seen = Arc<Mutex<Vec<String>>>;

    const PAGE: &str = "page_to :page";

    fn setup(cfg: Config) -> (Arc<TemplateRouter>, Arc<Dispatcher>) {
        let router = Arc::new(TemplateRouter::new());
        let dispatcher = Dispatcher::builder(router.clone()).with_config(cfg).build();
        (router, dispatcher)
    }

    /// Suspends on the sender's scope for `page_to :page`, records what came back.
    fn pager(seen: &Seen, options: WaitOptions) -> HandlerRef {
        let seen = Arc::clone(seen);
        HandlerFn::arc("pager", move |mut fiber: Fiber, ev: RoutedEvent| {
            let seen = Arc::clone(&seen);
            async move {
                let source = ev.message().sender_scope();
                match fiber.suspend(source, PAGE, options).await {
                    Ok(next) => seen.lock().push(next.param("page").unwrap_or("-").to_string()),
                    Err(e) => seen.lock().push(e.as_label().to_string()),
                }
                Ok::<(), HandlerError>(())
            }
        })
    }

    /// Suspends for "yes" on either the channel or the sender scope.
    fn asker(seen: &Seen, tag: &'static str, on_channel: bool) -> HandlerRef {
        let seen = Arc::clone(seen);
        HandlerFn::arc(tag, move |mut fiber: Fiber, ev: RoutedEvent| {
            let seen = Arc::clone(&seen);
            async move {
                let msg = ev.message();
                let source = match (on_channel, msg.channel_scope()) {
                    (true, Some(channel)) => channel,
                    _ => msg.sender_scope(),
                };
                fiber.suspend(source, "yes", WaitOptions::default()).await?;
                seen.lock().push(tag.to_string());
                Ok::<(), HandlerError>(())
            }
        })
    }

    fn say(sender: &str, text: &str) -> Message {
        Message::new(sender.to_string(), text.to_string())
    }

    fn drain_kinds(rx: &mut broadcast::Receiver<Event>) -> Vec<EventKind> {
        let mut kinds = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            kinds.push(ev.kind);
        }
        kinds
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl Reply for Recorder {
        fn reply(&self, text: &str) {
            self.0.lock().push(text.to_string());
        }
    }

    #[tokio::test]
    async fn test_resume_delivers_event_and_unbinds_rule() {
        let (router, d) = setup(Config::default());
        let seen: Seen = Arc::default();
        router.map("show", pager(&seen, WaitOptions::default()), RouteOptions::fiber());
        let mut rx = d.subscribe();

        let out = d.dispatch(say("alice", "show")).await;
        let DispatchOutcome::Handled { fiber, status: FiberStatus::Parked(wait) } = out else {
            panic!("unexpected outcome: {out:?}");
        };
        assert!(!fiber.is_root());
        assert_eq!(d.pending_len(), 1);
        assert_eq!(d.pending()[0].id, wait);
        assert!(d.is_bound(PAGE));
        assert!(router.has_pattern(PAGE));

        let out = d.dispatch(say("alice", "page_to 2")).await;
        assert_eq!(
            out,
            DispatchOutcome::Resumed {
                wait,
                fiber,
                status: FiberStatus::Finished(Ok(())),
            }
        );
        assert_eq!(*seen.lock(), vec!["2".to_string()]);
        assert_eq!(d.pending_len(), 0);
        assert!(!router.has_pattern(PAGE));

        assert_eq!(d.dispatch(say("alice", "page_to 3")).await, DispatchOutcome::Unrouted);

        assert_eq!(
            drain_kinds(&mut rx),
            vec![
                EventKind::FiberStarted,
                EventKind::PatternBound,
                EventKind::WaitRegistered,
                EventKind::FiberParked,
                EventKind::PatternUnbound,
                EventKind::WaitResumed,
                EventKind::FiberStopped,
                EventKind::MessageUnrouted,
            ]
        );
    }

    #[tokio::test]
    async fn test_other_sender_cannot_resume() {
        let (router, d) = setup(Config::default());
        let seen: Seen = Arc::default();
        router.map("show", pager(&seen, WaitOptions::default()), RouteOptions::fiber());

        d.dispatch(say("alice", "show")).await;
        assert_eq!(d.dispatch(say("bob", "page_to 2")).await, DispatchOutcome::NoPendingWait);

        assert_eq!(d.pending_len(), 1);
        assert!(seen.lock().is_empty());
        assert!(d.is_bound(PAGE));
    }

    #[tokio::test]
    async fn test_fiber_suspends_repeatedly() {
        let (router, d) = setup(Config::default());
        let seen: Seen = Arc::default();
        let s = Arc::clone(&seen);
        let counter = HandlerFn::arc("counter", move |mut fiber: Fiber, ev: RoutedEvent| {
            let seen = Arc::clone(&s);
            async move {
                let source = ev.message().sender_scope();
                for _ in 0..2 {
                    let next = fiber.suspend(source.clone(), "more", WaitOptions::default()).await?;
                    seen.lock().push(next.message().text().to_string());
                }
                Ok::<(), HandlerError>(())
            }
        });
        router.map("count", counter, RouteOptions::fiber());

        d.dispatch(say("alice", "count")).await;
        let first = d.dispatch(say("alice", "more")).await;
        assert!(matches!(
            first,
            DispatchOutcome::Resumed { status: FiberStatus::Parked(_), .. }
        ));
        assert!(router.has_pattern("more"));

        let second = d.dispatch(say("alice", "more")).await;
        assert!(matches!(
            second,
            DispatchOutcome::Resumed { status: FiberStatus::Finished(Ok(())), .. }
        ));
        assert_eq!(seen.lock().len(), 2);
        assert!(!router.has_pattern("more"));
    }

    #[tokio::test]
    async fn test_displace_keeps_only_newest_wait() {
        let (router, d) = setup(Config::default());
        let seen: Seen = Arc::default();
        router.map("show", pager(&seen, WaitOptions::default()), RouteOptions::fiber());

        let mut rx = d.subscribe();

        d.dispatch(say("alice", "show")).await;
        d.dispatch(say("bob", "show")).await;
        assert_eq!(d.pending_len(), 1);
        assert_eq!(d.displaced_len(), 1);
        assert_eq!(d.pattern_refs(PAGE), 1);

        let mut displaced = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|ev| ev.kind == EventKind::WaitDisplaced);
        let reason = displaced.next().and_then(|ev| ev.reason.clone()).unwrap();
        assert!(reason.ends_with("displaced=1"), "{reason}");

        assert_eq!(d.dispatch(say("alice", "page_to 2")).await, DispatchOutcome::NoPendingWait);
        assert!(matches!(
            d.dispatch(say("bob", "page_to 5")).await,
            DispatchOutcome::Resumed { .. }
        ));
        assert_eq!(*seen.lock(), vec!["5".to_string()]);
        assert!(!router.has_pattern(PAGE));
        assert_eq!(d.displaced_len(), 1);

        d.shutdown().await;
        assert_eq!(d.displaced_len(), 0);
        assert_eq!(*seen.lock(), vec!["5".to_string(), "wait_cancelled".to_string()]);
    }

    #[tokio::test]
    async fn test_coexist_prefers_channel_wait() {
        let cfg = Config {
            collision: CollisionPolicy::Coexist,
            ..Config::default()
        };
        let (router, d) = setup(cfg);
        let seen: Seen = Arc::default();
        router.map("watch", asker(&seen, "watch", true), RouteOptions::fiber());
        router.map("ask", asker(&seen, "ask", false), RouteOptions::fiber());

        d.dispatch(say("alice", "watch").in_channel("#ops")).await;
        d.dispatch(say("alice", "ask").in_channel("#ops")).await;
        assert_eq!(d.pending_len(), 2);
        assert_eq!(d.pattern_refs("yes"), 2);

        d.dispatch(say("alice", "yes").in_channel("#ops")).await;
        assert_eq!(*seen.lock(), vec!["watch".to_string()]);
        assert!(router.has_pattern("yes"));

        d.dispatch(say("alice", "yes").in_channel("#ops")).await;
        assert_eq!(*seen.lock(), vec!["watch".to_string(), "ask".to_string()]);
        assert!(!router.has_pattern("yes"));
    }

    #[tokio::test]
    async fn test_channel_wait_accepts_any_member() {
        let (router, d) = setup(Config::default());
        let seen: Seen = Arc::default();
        router.map("watch", asker(&seen, "watch", true), RouteOptions::fiber());

        d.dispatch(say("alice", "watch").in_channel("#ops")).await;
        assert_eq!(d.dispatch(say("carol", "yes")).await, DispatchOutcome::NoPendingWait);
        assert!(matches!(
            d.dispatch(say("carol", "yes").in_channel("#ops")).await,
            DispatchOutcome::Resumed { .. }
        ));
        assert_eq!(*seen.lock(), vec!["watch".to_string()]);
    }

    #[tokio::test]
    async fn test_root_suspend_is_protocol_misuse() {
        let (router, d) = setup(Config::default());
        let seen: Seen = Arc::default();
        router.map("oops", asker(&seen, "oops", false), RouteOptions::default());
        let mut rx = d.subscribe();

        let out = d.dispatch(say("alice", "oops")).await;
        assert_eq!(
            out,
            DispatchOutcome::Handled {
                fiber: FiberId::ROOT,
                status: FiberStatus::Finished(Err(HandlerError::Wait(WaitError::ProtocolMisuse))),
            }
        );
        assert_eq!(d.pending_len(), 0);
        assert!(!router.has_pattern("yes"));

        let kinds = drain_kinds(&mut rx);
        assert!(kinds.contains(&EventKind::ProtocolMisuse));
        assert!(kinds.contains(&EventKind::FiberDead));

        let mut root = d.root_fiber();
        assert!(root.is_root());
        assert_eq!(
            root.suspend(Scope::user("alice"), "yes", WaitOptions::default())
                .await
                .unwrap_err(),
            WaitError::ProtocolMisuse
        );
    }

    #[tokio::test]
    async fn test_unmatched_resume_is_noop() {
        let cfg = Config {
            reply_diagnostics: true,
            ..Config::default()
        };
        let (_router, d) = setup(cfg);
        let rec = Arc::new(Recorder::default());

        let mut params = Params::new();
        params.insert("page".into(), "2".into());
        let msg = say("alice", "page_to 2").with_reply(rec.clone());
        let out = d.resume(RoutedEvent::new(msg, PAGE, params)).await;

        assert_eq!(out, DispatchOutcome::NoPendingWait);
        assert_eq!(d.pending_len(), 0);
        assert_eq!(rec.0.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_timed_wait_expires() {
        let (router, d) = setup(Config::default());
        let seen: Seen = Arc::default();
        let opts = WaitOptions::timed(Duration::from_millis(50));
        router.map("show", pager(&seen, opts), RouteOptions::fiber());
        let mut rx = d.subscribe();

        d.dispatch(say("alice", "show")).await;
        assert_eq!(d.pending()[0].timeout, Some(Duration::from_millis(50)));

        time::sleep(Duration::from_millis(300)).await;

        assert_eq!(*seen.lock(), vec!["wait_expired".to_string()]);
        assert_eq!(d.pending_len(), 0);
        assert!(!router.has_pattern(PAGE));
        assert_eq!(d.dispatch(say("alice", "page_to 2")).await, DispatchOutcome::Unrouted);
        assert!(drain_kinds(&mut rx).contains(&EventKind::WaitExpired));
    }

    #[tokio::test]
    async fn test_resumed_wait_does_not_expire() {
        let (router, d) = setup(Config::default());
        let seen: Seen = Arc::default();
        let opts = WaitOptions::timed(Duration::from_millis(50));
        router.map("show", pager(&seen, opts), RouteOptions::fiber());

        d.dispatch(say("alice", "show")).await;
        d.dispatch(say("alice", "page_to 4")).await;
        time::sleep(Duration::from_millis(150)).await;

        assert_eq!(*seen.lock(), vec!["4".to_string()]);
    }

    #[tokio::test]
    async fn test_next_message_invalidation() {
        let (router, d) = setup(Config::default());
        let seen: Seen = Arc::default();
        router.map("show", pager(&seen, WaitOptions::next_message()), RouteOptions::fiber());

        d.dispatch(say("alice", "show")).await;
        assert_eq!(d.pending()[0].timeout, None);

        assert_eq!(d.dispatch(say("bob", "hello")).await, DispatchOutcome::Unrouted);
        assert_eq!(d.pending_len(), 1);

        assert_eq!(d.dispatch(say("alice", "hello")).await, DispatchOutcome::Unrouted);
        assert_eq!(*seen.lock(), vec!["wait_invalidated".to_string()]);
        assert_eq!(d.pending_len(), 0);
        assert!(!router.has_pattern(PAGE));
    }

    #[tokio::test]
    async fn test_next_message_wait_survives_its_own_answer() {
        let (router, d) = setup(Config::default());
        let seen: Seen = Arc::default();
        router.map("show", pager(&seen, WaitOptions::next_message()), RouteOptions::fiber());

        d.dispatch(say("alice", "show")).await;
        assert!(matches!(
            d.dispatch(say("alice", "page_to 7")).await,
            DispatchOutcome::Resumed { .. }
        ));
        assert_eq!(*seen.lock(), vec!["7".to_string()]);
    }

    #[tokio::test]
    async fn test_next_message_wait_ends_when_another_wait_takes_the_answer() {
        let cfg = Config {
            collision: CollisionPolicy::Coexist,
            ..Config::default()
        };
        let (router, d) = setup(cfg);
        let seen: Seen = Arc::default();
        router.map("watch", asker(&seen, "watch", true), RouteOptions::fiber());
        let confirm = {
            let seen = Arc::clone(&seen);
            HandlerFn::arc("confirm", move |mut fiber: Fiber, ev: RoutedEvent| {
                let seen = Arc::clone(&seen);
                async move {
                    let source = ev.message().sender_scope();
                    match fiber.suspend(source, "yes", WaitOptions::next_message()).await {
                        Ok(_) => seen.lock().push("confirm".to_string()),
                        Err(e) => seen.lock().push(e.as_label().to_string()),
                    }
                    Ok::<(), HandlerError>(())
                }
            })
        };
        router.map("ask", confirm, RouteOptions::fiber());

        d.dispatch(say("alice", "watch").in_channel("#ops")).await;
        d.dispatch(say("alice", "ask").in_channel("#ops")).await;
        assert_eq!(d.pending_len(), 2);

        let out = d.dispatch(say("alice", "yes").in_channel("#ops")).await;
        assert!(matches!(out, DispatchOutcome::Resumed { .. }));
        assert_eq!(
            *seen.lock(),
            vec!["wait_invalidated".to_string(), "watch".to_string()]
        );
        assert_eq!(d.pending_len(), 0);
        assert!(!router.has_pattern("yes"));

        assert_eq!(d.dispatch(say("alice", "yes")).await, DispatchOutcome::Unrouted);
        assert_eq!(seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_external_routing_still_ends_next_message_waits() {
        let (router, d) = setup(Config::default());
        let seen: Seen = Arc::default();
        router.map("show", pager(&seen, WaitOptions::next_message()), RouteOptions::fiber());

        d.dispatch(say("alice", "show")).await;
        let unrelated = RoutedEvent::new(say("alice", "yes"), "yes", Params::new());
        assert_eq!(d.resume(unrelated).await, DispatchOutcome::NoPendingWait);
        assert_eq!(*seen.lock(), vec!["wait_invalidated".to_string()]);
        assert_eq!(d.pending_len(), 0);

        d.dispatch(say("bob", "show")).await;
        assert_eq!(d.observe(&say("carol", "hi")).await, 0);
        assert_eq!(d.pending_len(), 1);
        assert_eq!(d.observe(&say("bob", "hi")).await, 1);
        assert_eq!(d.pending_len(), 0);
        assert!(!router.has_pattern(PAGE));
        assert_eq!(seen.lock().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_resumes_deliver_once() {
        let (router, d) = setup(Config::default());
        let seen: Seen = Arc::default();
        router.map("show", pager(&seen, WaitOptions::default()), RouteOptions::fiber());
        d.dispatch(say("alice", "show")).await;

        let a = tokio::spawn({
            let d = Arc::clone(&d);
            async move { d.dispatch(say("alice", "page_to 2")).await }
        });
        let b = tokio::spawn({
            let d = Arc::clone(&d);
            async move { d.dispatch(say("alice", "page_to 3")).await }
        });
        let outcomes = [a.await.unwrap(), b.await.unwrap()];

        let resumed = outcomes
            .iter()
            .filter(|o| matches!(o, DispatchOutcome::Resumed { .. }))
            .count();
        assert_eq!(resumed, 1);
        assert!(outcomes.contains(&DispatchOutcome::Unrouted));
        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_releases_wait_once() {
        let (router, d) = setup(Config::default());
        let seen: Seen = Arc::default();
        router.map("show", pager(&seen, WaitOptions::default()), RouteOptions::fiber());

        d.dispatch(say("alice", "show")).await;
        let id = d.pending()[0].id;

        assert!(d.cancel(id).await);
        assert!(!d.cancel(id).await);
        assert_eq!(*seen.lock(), vec!["wait_cancelled".to_string()]);
        assert!(!router.has_pattern(PAGE));
    }

    #[tokio::test]
    async fn test_shutdown_closes_dispatcher() {
        let (router, d) = setup(Config::default());
        let seen: Seen = Arc::default();
        router.map("show", pager(&seen, WaitOptions::default()), RouteOptions::fiber());

        d.dispatch(say("alice", "show")).await;
        d.shutdown().await;

        assert!(d.is_closed());
        assert_eq!(*seen.lock(), vec!["wait_cancelled".to_string()]);
        assert_eq!(d.dispatch(say("alice", "show")).await, DispatchOutcome::Closed);
        assert_eq!(d.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_dropping_dispatcher_cancels_parked_fibers() {
        let (router, d) = setup(Config::default());
        let seen: Seen = Arc::default();
        router.map("show", pager(&seen, WaitOptions::default()), RouteOptions::fiber());

        d.dispatch(say("alice", "show")).await;
        drop(d);
        time::sleep(Duration::from_millis(50)).await;

        assert_eq!(*seen.lock(), vec!["wait_cancelled".to_string()]);
    }

    #[tokio::test]
    async fn test_handler_panic_is_isolated() {
        let (router, d) = setup(Config::default());
        let boom = HandlerFn::arc("boom", |_fiber: Fiber, _ev: RoutedEvent| async move {
            if true {
                panic!("boom");
            }
            Ok::<(), HandlerError>(())
        });
        router.map("boom", boom, RouteOptions::fiber());

        let out = d.dispatch(say("alice", "boom")).await;
        assert!(matches!(
            out,
            DispatchOutcome::Handled {
                status: FiberStatus::Finished(Err(HandlerError::Panicked { .. })),
                ..
            }
        ));
        assert_eq!(d.dispatch(say("alice", "nothing")).await, DispatchOutcome::Unrouted);
    }

    #[tokio::test]
    async fn test_threaded_handler_runs_detached() {
        let (router, d) = setup(Config::default());
        let (tx, rx) = oneshot::channel::<bool>();
        let tx = Arc::new(Mutex::new(Some(tx)));
        let h = HandlerFn::arc("bg", move |fiber: Fiber, _ev: RoutedEvent| {
            let tx = Arc::clone(&tx);
            async move {
                if let Some(tx) = tx.lock().take() {
                    let _ = tx.send(fiber.is_root());
                }
                Ok::<(), HandlerError>(())
            }
        });
        router.map("bg", h, RouteOptions::threaded());

        assert_eq!(d.dispatch(say("alice", "bg")).await, DispatchOutcome::Detached);
        assert!(rx.await.unwrap());
    }

    #[tokio::test]
    async fn test_run_stops_when_inbox_closes() {
        let (router, d) = setup(Config::default());
        let seen: Seen = Arc::default();
        router.map("show", pager(&seen, WaitOptions::default()), RouteOptions::fiber());
        let mut rx = d.subscribe();

        let (tx, inbox) = mpsc::channel(8);
        tx.send(say("alice", "show")).await.unwrap();
        tx.send(say("alice", "page_to 9")).await.unwrap();
        tx.send(say("bob", "show")).await.unwrap();
        drop(tx);

        d.run(inbox).await.unwrap();

        assert_eq!(*seen.lock(), vec!["9".to_string(), "wait_cancelled".to_string()]);
        let kinds = drain_kinds(&mut rx);
        assert!(kinds.contains(&EventKind::ShutdownRequested));
        assert_eq!(kinds.last(), Some(&EventKind::AllStoppedWithin));
    }

    #[tokio::test]
    async fn test_close_stops_run() {
        let (_router, d) = setup(Config::default());
        let (_tx, inbox) = mpsc::channel::<Message>(8);

        let runner = tokio::spawn({
            let d = Arc::clone(&d);
            async move { d.run(inbox).await }
        });
        time::sleep(Duration::from_millis(20)).await;
        d.close();

        runner.await.unwrap().unwrap();
        assert!(d.is_closed());
    }
}
