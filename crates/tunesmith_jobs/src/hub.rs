//! Subscription Hub - fan-out of progress events to live listeners.
//!
//! Delivery is live-tail, at-most-once, best-effort: each subscriber
//! owns a bounded channel, a publish iterates over a snapshot of
//! subscriber handles, and a send that fails or exceeds the bounded
//! timeout disconnects the subscriber. Disconnected subscribers are
//! unregistered outside the delivery iteration and receive no catch-up.

use crate::metrics::METRICS;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;
use tunesmith_protocol::defaults;

/// Handle identifying one registered subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// The receiving side handed to a subscriber.
pub struct Subscription<E> {
    pub id: SubscriberId,
    pub events: mpsc::Receiver<E>,
}

struct SubscriberEntry<E> {
    tx: mpsc::Sender<E>,
    connected: Arc<AtomicBool>,
}

/// Fan-out hub for one event type.
///
/// # Lock Invariant
///
/// The registry mutex is held only to snapshot, insert or remove
/// entries; sends happen on the snapshot, outside the lock.
pub struct SubscriptionHub<E> {
    subscribers: Mutex<HashMap<SubscriberId, SubscriberEntry<E>>>,
    next_id: AtomicU64,
    send_timeout: Duration,
    channel_capacity: usize,
}

impl<E: Clone + Send + 'static> SubscriptionHub<E> {
    pub fn new(send_timeout: Duration) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            send_timeout,
            channel_capacity: defaults::SUBSCRIBER_CHANNEL_CAPACITY,
        }
    }

    /// Register a new subscriber and return its subscription.
    pub fn register(&self) -> Subscription<E> {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let entry = SubscriberEntry {
            tx,
            connected: Arc::new(AtomicBool::new(true)),
        };
        self.subscribers
            .lock()
            .expect("subscriber registry lock poisoned")
            .insert(id, entry);
        METRICS.inc_subscribers_registered();
        debug!("Registered {}", id);
        Subscription { id, events: rx }
    }

    /// Remove a subscriber. Returns false if it was already gone.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let removed = self
            .subscribers
            .lock()
            .expect("subscriber registry lock poisoned")
            .remove(&id);
        if let Some(entry) = &removed {
            entry.connected.store(false, Ordering::SeqCst);
            debug!("Unregistered {}", id);
        }
        removed.is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .expect("subscriber registry lock poisoned")
            .len()
    }

    /// Deliver an event to every currently registered subscriber.
    ///
    /// Never blocks longer than `send_timeout` per subscriber; a
    /// subscriber that cannot keep up is disconnected.
    pub async fn publish(&self, event: &E) {
        let snapshot: Vec<(SubscriberId, mpsc::Sender<E>, Arc<AtomicBool>)> = {
            let subscribers = self
                .subscribers
                .lock()
                .expect("subscriber registry lock poisoned");
            subscribers
                .iter()
                .map(|(id, entry)| (*id, entry.tx.clone(), Arc::clone(&entry.connected)))
                .collect()
        };

        let mut disconnected = Vec::new();
        for (id, tx, connected) in snapshot {
            let delivered =
                match tokio::time::timeout(self.send_timeout, tx.send(event.clone())).await {
                    Ok(Ok(())) => true,
                    // Receiver dropped or buffer stayed full past the timeout.
                    Ok(Err(_)) | Err(_) => false,
                };
            if !delivered {
                connected.store(false, Ordering::SeqCst);
                disconnected.push(id);
            }
        }
        METRICS.inc_events_published();

        for id in disconnected {
            debug!("Disconnecting {} after failed send", id);
            METRICS.inc_subscribers_disconnected();
            self.unregister(id);
        }
    }
}
