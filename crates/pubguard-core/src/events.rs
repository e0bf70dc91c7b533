//! In-process pub/sub event bus (§4.2).
//!
//! Every subscriber owns a bounded buffer (capacity configured, default 32).
//! `publish` is never allowed to block the caller: delivery to a subscriber
//! is a non-blocking `try_send`, and if that subscriber's buffer is full its
//! copy of the event is dropped -- the publisher's call always returns
//! immediately, and every other subscriber still gets its copy. A ceiling on
//! concurrent subscribers (default 16) keeps the subscriber list, and the
//! worst-case fan-out cost of one `publish` call, bounded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::domain::{DraftStatus, Platform};
use crate::error::EventBusError;

/// A typed message broadcast to subscribers (§3 Event).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Event {
    ApprovalChanged {
        draft_id: String,
        client_id: String,
        old_status: DraftStatus,
        new_status: DraftStatus,
    },
    PublishComplete {
        draft_id: String,
        client_id: String,
        platform: Platform,
        url: String,
    },
    PublishFailed {
        draft_id: String,
        client_id: String,
        platform: Platform,
        error: String,
    },
    RecoveryComplete {
        draft_id: String,
        client_id: String,
        status: String,
    },
    ContentStale {
        draft_id: String,
        client_id: String,
        client_name: String,
        hours_stale: i64,
    },
}

impl Event {
    /// The SSE event name this variant should be sent under (§6).
    pub fn name(&self) -> &'static str {
        match self {
            Event::ApprovalChanged { .. } => "approval_changed",
            Event::PublishComplete { .. } => "publish_complete",
            Event::PublishFailed { .. } => "publish_failed",
            Event::RecoveryComplete { .. } => "recovery_complete",
            Event::ContentStale { .. } => "content_stale",
        }
    }
}

struct Subscriber {
    id: u64,
    sender: mpsc::Sender<Event>,
}

/// A subscription handle. Dropping it does not unsubscribe -- call
/// [`EventBus::unsubscribe`] explicitly, matching the spec's explicit
/// `(stream, unsubscribe)` pair rather than relying on `Drop` semantics.
pub struct Subscription {
    pub id: u64,
    pub receiver: mpsc::Receiver<Event>,
}

/// In-process fan-out bus, shared behind an `Arc` by the approval service,
/// scheduler, recovery service, and every SSE handler task.
pub struct EventBus {
    subscribers: Mutex<HashMap<u64, Subscriber>>,
    next_id: AtomicU64,
    max_subscribers: usize,
    buffer_capacity: usize,
}

impl EventBus {
    pub fn new(max_subscribers: usize, buffer_capacity: usize) -> Self {
        EventBus {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            max_subscribers,
            buffer_capacity,
        }
    }

    /// Register a new subscriber. Fails once `max_subscribers` concurrent
    /// subscribers are already registered.
    pub fn subscribe(&self) -> Result<Subscription, EventBusError> {
        let mut subs = self.subscribers.lock().expect("event bus mutex poisoned");
        if subs.len() >= self.max_subscribers {
            return Err(EventBusError::TooManySubscribers {
                limit: self.max_subscribers,
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.buffer_capacity);
        subs.insert(id, Subscriber { id, sender });

        Ok(Subscription { id, receiver })
    }

    /// Release a subscriber slot. Any events still sitting in its buffer are
    /// dropped along with the channel.
    pub fn unsubscribe(&self, id: u64) {
        self.subscribers
            .lock()
            .expect("event bus mutex poisoned")
            .remove(&id);
    }

    /// Deliver `event` to every current subscriber. Never blocks: a full
    /// buffer means that subscriber drops this event, logged at `warn`, and
    /// every other subscriber is still attempted.
    pub fn publish(&self, event: Event) {
        let subs: Vec<(u64, mpsc::Sender<Event>)> = {
            let subs = self.subscribers.lock().expect("event bus mutex poisoned");
            subs.values()
                .map(|s| (s.id, s.sender.clone()))
                .collect()
        };

        for (id, sender) in subs {
            if let Err(mpsc::error::TrySendError::Full(_)) = sender.try_send(event.clone()) {
                tracing::warn!(subscriber_id = id, event = event.name(), "event dropped, subscriber buffer full");
            }
        }
    }

    /// Current number of registered subscribers, for diagnostics/tests.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().expect("event bus mutex poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> Event {
        Event::ApprovalChanged {
            draft_id: "d1".to_string(),
            client_id: "c1".to_string(),
            old_status: DraftStatus::InReview,
            new_status: DraftStatus::Approved,
        }
    }

    #[test]
    fn publish_delivers_to_all_subscribers() {
        let bus = EventBus::new(16, 32);
        let mut sub_a = bus.subscribe().unwrap();
        let mut sub_b = bus.subscribe().unwrap();

        bus.publish(sample_event());

        assert!(sub_a.receiver.try_recv().is_ok());
        assert!(sub_b.receiver.try_recv().is_ok());
    }

    #[test]
    fn subscribe_past_ceiling_fails() {
        let bus = EventBus::new(2, 32);
        let _a = bus.subscribe().unwrap();
        let _b = bus.subscribe().unwrap();

        let err = bus.subscribe().unwrap_err();
        assert!(matches!(err, EventBusError::TooManySubscribers { limit: 2 }));
    }

    #[test]
    fn unsubscribe_frees_a_slot() {
        let bus = EventBus::new(1, 32);
        let sub = bus.subscribe().unwrap();
        assert!(bus.subscribe().is_err());

        bus.unsubscribe(sub.id);
        assert!(bus.subscribe().is_ok());
    }

    #[test]
    fn full_buffer_drops_event_without_erroring() {
        let bus = EventBus::new(16, 1);
        let mut sub = bus.subscribe().unwrap();

        bus.publish(sample_event());
        bus.publish(sample_event());
        bus.publish(sample_event());

        // Only the first event (buffer capacity 1) survives; later publishes
        // are silently dropped for this subscriber, never erroring back to
        // the caller.
        assert!(sub.receiver.try_recv().is_ok());
        assert!(sub.receiver.try_recv().is_err());
    }

    #[test]
    fn events_preserve_publish_order_per_subscriber() {
        let bus = EventBus::new(16, 32);
        let mut sub = bus.subscribe().unwrap();

        bus.publish(Event::ContentStale {
            draft_id: "d1".to_string(),
            client_id: "c1".to_string(),
            client_name: "Acme".to_string(),
            hours_stale: 5,
        });
        bus.publish(Event::ContentStale {
            draft_id: "d2".to_string(),
            client_id: "c1".to_string(),
            client_name: "Acme".to_string(),
            hours_stale: 6,
        });

        let first = sub.receiver.try_recv().unwrap();
        let second = sub.receiver.try_recv().unwrap();
        match (first, second) {
            (Event::ContentStale { draft_id: d1, .. }, Event::ContentStale { draft_id: d2, .. }) => {
                assert_eq!(d1, "d1");
                assert_eq!(d2, "d2");
            }
            _ => panic!("unexpected event variants"),
        }
    }
}
