//! Event bus
//!
//! Topic fan-out to connected subscribers plus a bounded ring of recent
//! events for cold reads. Publishing never blocks: each subscriber owns a
//! bounded queue and a subscriber whose queue overflows is disconnected
//! rather than stalling the publisher.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use zkiot_core::constants::{EVENT_HISTORY, MAX_SUB_QUEUE};
use zkiot_core::types::{Event, EventKind};

use crate::time::unix_now;

struct Subscriber {
    topics: HashSet<EventKind>,
    tx: mpsc::Sender<Event>,
}

/// Bus state: subscriber table plus the history ring
pub struct EventBus {
    subscribers: RwLock<HashMap<String, Subscriber>>,
    history: RwLock<VecDeque<Event>>,
    history_size: usize,
    queue_bound: usize,
    seq: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_HISTORY, MAX_SUB_QUEUE)
    }
}

impl EventBus {
    pub fn new(history_size: usize, queue_bound: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            history: RwLock::new(VecDeque::with_capacity(history_size)),
            history_size,
            queue_bound: queue_bound.max(1),
            seq: AtomicU64::new(1),
        }
    }

    /// Open a session for `client_id`, subscribed to every topic
    ///
    /// A reconnect under the same id replaces the previous session.
    pub async fn connect(&self, client_id: &str) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(self.queue_bound);
        let mut subscribers = self.subscribers.write().await;
        subscribers.insert(
            client_id.to_string(),
            Subscriber {
                topics: EventKind::all().iter().copied().collect(),
                tx,
            },
        );
        debug!(client_id, total = subscribers.len(), "subscriber connected");
        rx
    }

    pub async fn disconnect(&self, client_id: &str) {
        let mut subscribers = self.subscribers.write().await;
        if subscribers.remove(client_id).is_some() {
            debug!(client_id, total = subscribers.len(), "subscriber disconnected");
        }
    }

    /// Narrow a session to one more topic
    pub async fn subscribe_topic(&self, client_id: &str, kind: EventKind) -> bool {
        let mut subscribers = self.subscribers.write().await;
        match subscribers.get_mut(client_id) {
            Some(sub) => {
                sub.topics.insert(kind);
                true
            }
            None => false,
        }
    }

    pub async fn unsubscribe_topic(&self, client_id: &str, kind: EventKind) -> bool {
        let mut subscribers = self.subscribers.write().await;
        match subscribers.get_mut(client_id) {
            Some(sub) => {
                sub.topics.remove(&kind);
                true
            }
            None => false,
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Publish to every interested subscriber and record in the ring
    pub async fn publish(&self, kind: EventKind, payload: serde_json::Value) -> Event {
        let event = Event {
            event_id: self.seq.fetch_add(1, Ordering::SeqCst),
            kind,
            payload,
            at: unix_now(),
        };

        {
            let mut history = self.history.write().await;
            if history.len() == self.history_size {
                history.pop_front();
            }
            history.push_back(event.clone());
        }

        // try_send keeps the publisher non-blocking; slow or closed
        // subscribers are collected and dropped afterwards.
        let mut dead = Vec::new();
        {
            let subscribers = self.subscribers.read().await;
            for (client_id, sub) in subscribers.iter() {
                if !sub.topics.contains(&kind) {
                    continue;
                }
                match sub.tx.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(client_id, ?kind, "subscriber queue full, disconnecting");
                        dead.push(client_id.clone());
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        dead.push(client_id.clone());
                    }
                }
            }
        }
        if !dead.is_empty() {
            let mut subscribers = self.subscribers.write().await;
            for client_id in dead {
                subscribers.remove(&client_id);
            }
        }

        event
    }

    /// Most recent events, oldest first, at most `limit`
    pub async fn recent(&self, limit: usize) -> Vec<Event> {
        let history = self.history.read().await;
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }
}
