//! # Pattern binder: reference-counted resume rules.
//!
//! Every pending wait needs its pattern routed to the resume path. The binder
//! installs one `RouteTarget::Resume` rule per pattern on the first reference
//! and removes it when the last reference is released.
//!
//! ```text
//! acquire("more")  refs 0 → 1   router.register_pattern("more", Resume)   PatternBound
//! acquire("more")  refs 1 → 2
//! release("more")  refs 2 → 1
//! release("more")  refs 1 → 0   router.unregister_pattern("more")         PatternUnbound
//! ```
//!
//! ## Rules
//! - a pattern the router already knows (a handler rule, or a rule installed by
//!   someone else) is counted but never registered or removed by the binder
//! - acquire the new wait's pattern before releasing displaced waits, so a
//!   shared rule is never torn down and re-installed in between

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::events::{Bus, Event, EventKind};
use crate::routing::{PatternRouter, RouteOptions, RouteTarget};

struct Binding {
    refs: usize,
    owned: bool,
}

pub(crate) struct PatternBinder {
    router: Arc<dyn PatternRouter>,
    bus: Bus,
    bindings: Mutex<HashMap<Arc<str>, Binding>>,
}

impl PatternBinder {
    pub(crate) fn new(router: Arc<dyn PatternRouter>, bus: Bus) -> Self {
        Self {
            router,
            bus,
            bindings: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn acquire(&self, pattern: &Arc<str>) {
        let mut bindings = self.bindings.lock();
        let binding = bindings.entry(Arc::clone(pattern)).or_insert(Binding {
            refs: 0,
            owned: false,
        });

        if binding.refs == 0 && !self.router.has_pattern(pattern) {
            self.router
                .register_pattern(pattern, RouteTarget::Resume, RouteOptions::resume());
            binding.owned = true;
            self.bus
                .publish(Event::new(EventKind::PatternBound).with_pattern(Arc::clone(pattern)));
        }
        binding.refs += 1;
    }

    pub(crate) fn release(&self, pattern: &Arc<str>) {
        let mut bindings = self.bindings.lock();
        let Some(binding) = bindings.get_mut(pattern) else {
            return;
        };
        binding.refs = binding.refs.saturating_sub(1);
        if binding.refs > 0 {
            return;
        }

        if let Some(Binding { owned: true, .. }) = bindings.remove(pattern) {
            self.router.unregister_pattern(pattern);
            self.bus
                .publish(Event::new(EventKind::PatternUnbound).with_pattern(Arc::clone(pattern)));
        }
    }

    /// Number of live references on `pattern`.
    pub(crate) fn refs(&self, pattern: &str) -> usize {
        self.bindings.lock().get(pattern).map_or(0, |b| b.refs)
    }

    /// Returns `true` if the binder installed the rule for `pattern`.
    pub(crate) fn is_bound(&self, pattern: &str) -> bool {
        self.bindings
            .lock()
            .get(pattern)
            .is_some_and(|b| b.owned && b.refs > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Fiber;
    use crate::error::HandlerError;
    use crate::handlers::HandlerFn;
    use crate::message::RoutedEvent;
    use crate::routing::TemplateRouter;

    fn binder() -> (Arc<TemplateRouter>, PatternBinder, Bus) {
        let router = Arc::new(TemplateRouter::new());
        let bus = Bus::new(64);
        let binder = PatternBinder::new(router.clone(), bus.clone());
        (router, binder, bus)
    }

    #[test]
    fn test_rule_lives_while_referenced() {
        let (router, binder, bus) = binder();
        let mut rx = bus.subscribe();
        let more: Arc<str> = Arc::from("more");

        binder.acquire(&more);
        binder.acquire(&more);
        assert!(router.has_pattern("more"));
        assert!(binder.is_bound("more"));
        assert_eq!(binder.refs("more"), 2);

        binder.release(&more);
        assert!(router.has_pattern("more"));

        binder.release(&more);
        assert!(!router.has_pattern("more"));
        assert!(!binder.is_bound("more"));
        assert_eq!(binder.refs("more"), 0);

        assert_eq!(rx.try_recv().unwrap().kind, EventKind::PatternBound);
        assert_eq!(rx.try_recv().unwrap().kind, EventKind::PatternUnbound);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_foreign_rule_is_never_removed() {
        let (router, binder, _bus) = binder();
        let h = HandlerFn::arc("pager", |_fiber: Fiber, _ev: RoutedEvent| async {
            Ok::<(), HandlerError>(())
        });
        router.map("more", h, RouteOptions::fiber());
        let more: Arc<str> = Arc::from("more");

        binder.acquire(&more);
        assert!(!binder.is_bound("more"));
        binder.release(&more);

        assert!(router.has_pattern("more"));
    }

    #[test]
    fn test_release_without_acquire_is_noop() {
        let (router, binder, _bus) = binder();
        binder.release(&Arc::from("never"));
        assert!(!router.has_pattern("never"));
    }
}
