//! Typed publish/subscribe event bus.
//!
//! Producers (the executor and its worker tasks) broadcast events without
//! knowing who listens; consumers (CLI, report generator, the façade)
//! subscribe per event type. Delivery is synchronous on the publishing
//! thread, in subscription order, under a single mutex covering both the
//! subscriber map and the notification loop. Handlers must therefore be
//! cheap and non-blocking; a panicking handler is trapped and dropped
//! without stopping the pipeline.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;

type Handler = Box<dyn Fn(&dyn Any) + Send>;

/// Type-safe publish/subscribe bus.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<HashMap<TypeId, Vec<Handler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus::default()
    }

    /// Register `handler` for events of type `E`.
    ///
    /// Subscription normally happens during single-threaded startup, but
    /// the map is locked so late subscriptions are merely discouraged, not
    /// unsafe.
    pub fn subscribe<E: Any>(&self, handler: impl Fn(&E) + Send + 'static) {
        let mut map = self.subscribers.lock().unwrap();
        map.entry(TypeId::of::<E>())
            .or_default()
            .push(Box::new(move |any| {
                if let Some(event) = any.downcast_ref::<E>() {
                    handler(event);
                }
            }));
    }

    /// Deliver `event` to every handler registered for its type,
    /// synchronously and in subscription order.
    pub fn publish<E: Any>(&self, event: E) {
        let map = self.subscribers.lock().unwrap();
        if let Some(handlers) = map.get(&TypeId::of::<E>()) {
            for handler in handlers {
                // A misbehaving subscriber must not take the pipeline down.
                let result = catch_unwind(AssertUnwindSafe(|| handler(&event)));
                if result.is_err() {
                    log::warn!("event handler panicked; event dropped for that subscriber");
                }
            }
        }
    }
}
