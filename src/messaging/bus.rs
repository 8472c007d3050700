/// Event bus for pub/sub messaging
///
/// Publishing never blocks: a full bounded subscriber misses the event, and a
/// subscriber whose receiver was dropped is pruned on the next publish.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use parking_lot::RwLock;

use super::events::Event;

/// Subscriber ID for tracking subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(usize);

struct Subscriber {
    id: SubscriberId,
    sender: Sender<Event>,
}

/// Event bus for broadcasting events to subscribers
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<RwLock<Vec<Subscriber>>>,
    next_id: Arc<AtomicUsize>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe with an unbounded queue
    pub fn subscribe(&self) -> (Receiver<Event>, SubscriberId) {
        let (tx, rx) = unbounded();
        (rx, self.register(tx))
    }

    /// Subscribe with a queue of `capacity`; events beyond it are dropped
    /// for this subscriber only
    pub fn subscribe_bounded(&self, capacity: usize) -> (Receiver<Event>, SubscriberId) {
        let (tx, rx) = bounded(capacity.max(1));
        (rx, self.register(tx))
    }

    fn register(&self, sender: Sender<Event>) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push(Subscriber { id, sender });
        id
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers.write().retain(|s| s.id != id);
    }

    /// Publish an event to all subscribers, returning how many received it
    pub fn publish(&self, event: Event) -> usize {
        let mut delivered = 0;
        let mut disconnected = Vec::new();

        {
            let subscribers = self.subscribers.read();
            for subscriber in subscribers.iter() {
                match subscriber.sender.try_send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        tracing::trace!("Subscriber {:?} is full, dropping event", subscriber.id)
                    }
                    Err(TrySendError::Disconnected(_)) => disconnected.push(subscriber.id),
                }
            }
        }

        if !disconnected.is_empty() {
            self.subscribers
                .write()
                .retain(|s| !disconnected.contains(&s.id));
        }

        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn clear(&self) {
        self.subscribers.write().clear();
    }
}
