//! Event dispatcher: per-kind subscriber registries and synchronous fan-out.

use crate::gateway::protocol::{parse_frame, Envelope, EventKind, FrameError, GatewayEvent};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Callback invoked for every matching event.
pub type EventHandler = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// Which events a handler receives: one kind, or every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventFilter {
    Kind(EventKind),
    Any,
}

impl From<EventKind> for EventFilter {
    fn from(kind: EventKind) -> Self {
        EventFilter::Kind(kind)
    }
}

/// Process-wide so a handle kept from one client never matches a handler of another.
static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Handle returned by [`EventDispatcher::subscribe`]; pass it to `unsubscribe` to remove exactly that handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    id: u64,
    filter: EventFilter,
}

impl Subscription {
    pub fn filter(&self) -> EventFilter {
        self.filter
    }
}

#[derive(Default)]
struct Registry {
    handlers: HashMap<EventFilter, Vec<(u64, EventHandler)>>,
}

/// Routes events to subscribers. Handlers run outside the registry lock, so
/// they may subscribe, unsubscribe or send from inside a callback.
#[derive(Default)]
pub struct EventDispatcher {
    registry: Mutex<Registry>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        // A poisoned registry only means a panic happened while it was held; the map itself is intact.
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn subscribe<F>(&self, filter: impl Into<EventFilter>, handler: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        let filter = filter.into();
        let id = NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed);
        self.registry()
            .handlers
            .entry(filter)
            .or_default()
            .push((id, Arc::new(handler)));
        Subscription { id, filter }
    }

    /// Remove the handler behind `subscription`. Returns false if it was already removed.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let mut reg = self.registry();
        let Some(list) = reg.handlers.get_mut(&subscription.filter) else {
            return false;
        };
        let before = list.len();
        list.retain(|(id, _)| *id != subscription.id);
        let removed = list.len() != before;
        if list.is_empty() {
            reg.handlers.remove(&subscription.filter);
        }
        removed
    }

    pub fn handler_count(&self, filter: impl Into<EventFilter>) -> usize {
        self.registry()
            .handlers
            .get(&filter.into())
            .map_or(0, Vec::len)
    }

    /// Deliver an event to the handlers of its kind, then to the wildcard handlers, each in registration order.
    pub fn emit(&self, envelope: &Envelope) {
        let targets: Vec<EventHandler> = {
            let reg = self.registry();
            let specific = reg.handlers.get(&EventFilter::Kind(envelope.kind()));
            let wildcard = reg.handlers.get(&EventFilter::Any);
            specific
                .into_iter()
                .chain(wildcard)
                .flatten()
                .map(|(_, h)| Arc::clone(h))
                .collect()
        };
        for handler in targets {
            if panic::catch_unwind(AssertUnwindSafe(|| handler(envelope))).is_err() {
                log::error!("gateway event handler panicked on {}", envelope.kind());
            }
        }
    }

    /// Wrap `event` with the current time and emit it.
    pub fn emit_event(&self, event: GatewayEvent) {
        self.emit(&Envelope::now(event));
    }

    /// Parse an inbound frame and emit the resulting event. Malformed frames are logged and dropped.
    pub fn dispatch_frame(&self, text: &str) -> Option<EventKind> {
        match parse_frame(text) {
            Ok(Some(event)) => {
                let kind = event.kind();
                self.emit_event(event);
                Some(kind)
            }
            Ok(None) => None,
            Err(e @ FrameError::Json(_)) => {
                log::error!("failed to parse gateway frame: {}", e);
                None
            }
            Err(e) => {
                log::warn!("dropping gateway frame: {}", e);
                None
            }
        }
    }
}
