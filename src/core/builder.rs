//! Assembles a [`Dispatcher`] from a router, a [`Config`] and subscribers.

use std::sync::Arc;

use crate::{
    core::{Config, Dispatcher, dispatcher::Core},
    events::Bus,
    routing::PatternRouter,
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for constructing a [`Dispatcher`].
pub struct DispatcherBuilder {
    router: Arc<dyn PatternRouter>,
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl DispatcherBuilder {
    /// Creates a new builder over `router` with the default configuration.
    pub fn new(router: Arc<dyn PatternRouter>) -> Self {
        Self {
            router,
            cfg: Config::default(),
            subscribers: Vec::new(),
        }
    }

    /// Replaces the runtime configuration.
    pub fn with_config(mut self, cfg: Config) -> Self {
        self.cfg = cfg;
        self
    }

    /// Replaces the subscriber list.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Adds one event subscriber.
    pub fn with_subscriber(mut self, subscriber: Arc<dyn Subscribe>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    /// Wires the bus, wait registry and pattern binder around the router.
    ///
    /// With at least one subscriber this spawns the fan-out listener and one
    /// worker per subscriber, so it must then be called inside a tokio runtime.
    /// A subscriber-less dispatcher spawns nothing until the first fiber runs.
    pub fn build(self) -> Arc<Dispatcher> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let has_subscribers = !self.subscribers.is_empty();
        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));

        if has_subscribers {
            Dispatcher::subscriber_listener(&bus, Arc::downgrade(&subs));
        }

        let core = Arc::new(Core::new(self.cfg, bus, self.router));
        Arc::new(Dispatcher::new_internal(core, subs))
    }
}
