//! Typed event dispatch for inbound envelopes the correlator didn't
//! claim as a request/response. Subscriptions are handles: dropping one
//! unregisters it, so callers don't need an explicit `unsubscribe` call
//! on every shutdown path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use mew_protocol::{Envelope, Kind};

type Callback = Box<dyn Fn(&Envelope) + Send + Sync>;

struct Subscriber {
    kind: Option<Kind>,
    callback: Callback,
}

#[derive(Default)]
struct Inner {
    subscribers: Mutex<HashMap<u64, Subscriber>>,
    next_id: AtomicU64,
}

#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Inner>,
}

/// A live subscription. Dropping it unregisters the callback.
pub struct Subscription {
    id: u64,
    bus: Weak<Inner>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            inner.subscribers.lock().remove(&self.id);
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every envelope of a specific `kind`.
    pub fn on<F>(&self, kind: Kind, callback: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.insert(Some(kind), callback)
    }

    /// Subscribe to every envelope, regardless of kind.
    pub fn on_any<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.insert(None, callback)
    }

    fn insert<F>(&self, kind: Option<Kind>, callback: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.lock().insert(
            id,
            Subscriber {
                kind,
                callback: Box::new(callback),
            },
        );
        Subscription { id, bus: Arc::downgrade(&self.inner) }
    }

    pub fn dispatch(&self, envelope: &Envelope) {
        for subscriber in self.inner.subscribers.lock().values() {
            if subscriber.kind.is_none_or(|k| k == envelope.kind) {
                (subscriber.callback)(envelope);
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mew_protocol::EnvelopeBuilder;
    use std::sync::atomic::AtomicUsize;

    fn chat() -> Envelope {
        EnvelopeBuilder::new(Kind::Chat)
            .from("alice")
            .payload(serde_json::json!({"text": "hi"}))
            .build()
            .unwrap()
    }

    #[test]
    fn dispatches_only_to_matching_kind() {
        let bus = EventBus::new();
        let chat_hits = Arc::new(AtomicUsize::new(0));
        let presence_hits = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&chat_hits);
        let _sub1 = bus.on(Kind::Chat, move |_| {
            c.fetch_add(1, Ordering::Relaxed);
        });
        let p = Arc::clone(&presence_hits);
        let _sub2 = bus.on(Kind::SystemPresence, move |_| {
            p.fetch_add(1, Ordering::Relaxed);
        });
        bus.dispatch(&chat());
        assert_eq!(chat_hits.load(Ordering::Relaxed), 1);
        assert_eq!(presence_hits.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn dropping_subscription_unregisters_it() {
        let bus = EventBus::new();
        let sub = bus.on_any(|_| {});
        assert_eq!(bus.subscriber_count(), 1);
        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
