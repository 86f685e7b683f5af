//! The vehicle link capability and listener bookkeeping shared by its
//! implementations.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use parking_lot::Mutex;

use crate::telemetry::TelemetrySnapshot;

use super::messages::LinkMessage;

pub type MessagePredicate = Box<dyn Fn(&LinkMessage) -> bool + Send + Sync>;
pub type MessageCallback = Box<dyn Fn(&LinkMessage) + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Connection to the flight controller.
///
/// Callbacks run on the link's own receive context, never on the caller's
/// thread, so they must only hand data off (e.g. push onto a channel).
pub trait VehicleLink: Send + Sync {
    /// Latest telemetry, `None` until the autopilot has reported any.
    fn read_telemetry(&self) -> Option<TelemetrySnapshot>;

    fn send(&self, message: &LinkMessage) -> Result<()>;

    /// Invoke `callback` for every inbound message accepted by `predicate`.
    fn subscribe(&self, predicate: MessagePredicate, callback: MessageCallback) -> ListenerId;

    /// Remove a listener. Returns false if it was not registered.
    fn unsubscribe(&self, id: ListenerId) -> bool;
}

struct Listener {
    id: ListenerId,
    predicate: MessagePredicate,
    callback: MessageCallback,
}

/// Thread-safe set of message listeners.
///
/// Dispatch works on a snapshot of the registry, so a callback may
/// subscribe or unsubscribe without deadlocking.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<Vec<Arc<Listener>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, predicate: MessagePredicate, callback: MessageCallback) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.listeners.lock().push(Arc::new(Listener {
            id,
            predicate,
            callback,
        }));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|l| l.id != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `message` to every matching listener, in registration order.
    /// Returns the number of callbacks invoked.
    pub fn dispatch(&self, message: &LinkMessage) -> usize {
        let snapshot: Vec<Arc<Listener>> = self.listeners.lock().clone();
        let mut delivered = 0;
        for listener in snapshot {
            if (listener.predicate)(message) {
                (listener.callback)(message);
                delivered += 1;
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_dispatch_respects_predicate() {
        let registry = ListenerRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        registry.subscribe(
            Box::new(|m: &LinkMessage| m.is_ack_for(130)),
            Box::new(move |_: &LinkMessage| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let other = LinkMessage::CommandAck { command: 263, result: 0 };
        let matching = LinkMessage::CommandAck { command: 130, result: 0 };
        assert_eq!(registry.dispatch(&other), 0);
        assert_eq!(registry.dispatch(&matching), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_removes_listener() {
        let registry = ListenerRegistry::new();
        let noop = || -> (MessagePredicate, MessageCallback) {
            (Box::new(|_: &LinkMessage| true), Box::new(|_: &LinkMessage| {}))
        };
        let (p, c) = noop();
        let a = registry.subscribe(p, c);
        let (p, c) = noop();
        let b = registry.subscribe(p, c);
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);

        assert!(registry.unsubscribe(a));
        assert!(!registry.unsubscribe(a));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.dispatch(&LinkMessage::StatusText("x".into())), 1);
    }
}
