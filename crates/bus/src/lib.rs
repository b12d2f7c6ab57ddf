//! In-process publish/subscribe for decoupled communication between plugins
//! and core components.
//!
//! Delivery is synchronous and sequential on the publisher's task: within one
//! channel, subscribers see messages in publish order and are invoked in
//! subscription order. A failing subscriber is logged and skipped; it cannot
//! corrupt the bus or block publishers on other channels. Subscribers that
//! need off-thread work hand off to the background runner explicitly.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// A message sent through a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub channel: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub sender: Option<String>,
}

/// Boxed error returned by subscriber callbacks. Publish logs and swallows
/// these; a subscriber failure never propagates to the publisher.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Subscriber callback. Invoked on the publisher's task.
pub type Callback = Arc<dyn Fn(&Message) -> Result<(), CallbackError> + Send + Sync>;

/// Handle identifying one subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    callback: Callback,
}

#[derive(Default)]
struct Channel {
    subscribers: Vec<Subscriber>,
    history: VecDeque<Message>,
}

struct Inner {
    channels: HashMap<String, Channel>,
    next_id: u64,
}

/// Channel-based pub/sub with bounded per-channel message history.
pub struct EventBus {
    inner: Mutex<Inner>,
    history_size: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(Self::DEFAULT_HISTORY_SIZE)
    }
}

impl EventBus {
    pub const DEFAULT_HISTORY_SIZE: usize = 100;

    #[must_use]
    pub fn new(history_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                channels: HashMap::new(),
                next_id: 0,
            }),
            history_size,
        }
    }

    /// Subscribe to a channel. The returned id is the handle for
    /// [`unsubscribe`](Self::unsubscribe).
    pub fn subscribe(&self, channel: &str, callback: Callback) -> SubscriptionId {
        let mut inner = self.inner.lock().expect("bus lock poisoned");
        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;
        inner
            .channels
            .entry(channel.to_owned())
            .or_default()
            .subscribers
            .push(Subscriber { id, callback });
        debug!(channel, "subscribed");
        id
    }

    /// Remove a subscription. Unknown ids are ignored.
    pub fn unsubscribe(&self, channel: &str, id: SubscriptionId) {
        let mut inner = self.inner.lock().expect("bus lock poisoned");
        if let Some(ch) = inner.channels.get_mut(channel) {
            ch.subscribers.retain(|s| s.id != id);
            debug!(channel, "unsubscribed");
        }
    }

    /// Publish a message to a channel.
    ///
    /// The subscriber list is copied under the lock and the lock released
    /// before any callback runs, so a slow subscriber delays only this
    /// publisher.
    pub fn publish(&self, channel: &str, data: serde_json::Value, sender: Option<&str>) {
        let message = Message {
            channel: channel.to_owned(),
            data,
            timestamp: Utc::now(),
            sender: sender.map(str::to_owned),
        };

        let subscribers: Vec<Callback> = {
            let mut inner = self.inner.lock().expect("bus lock poisoned");
            let ch = inner.channels.entry(channel.to_owned()).or_default();
            ch.history.push_back(message.clone());
            while ch.history.len() > self.history_size {
                ch.history.pop_front();
            }
            ch.subscribers
                .iter()
                .map(|s| Arc::clone(&s.callback))
                .collect()
        };

        debug!(channel, subscribers = subscribers.len(), "publishing");

        for callback in subscribers {
            if let Err(e) = callback(&message) {
                error!(channel, error = %e, "subscriber callback failed");
            }
        }
    }

    /// Recent messages on a channel, oldest first.
    #[must_use]
    pub fn history(&self, channel: &str, limit: Option<usize>) -> Vec<Message> {
        let inner = self.inner.lock().expect("bus lock poisoned");
        let Some(ch) = inner.channels.get(channel) else {
            return Vec::new();
        };
        let take = limit.unwrap_or(ch.history.len()).min(ch.history.len());
        ch.history.iter().skip(ch.history.len() - take).cloned().collect()
    }

    /// Drop retained history for one channel, or for all channels.
    pub fn clear_history(&self, channel: Option<&str>) {
        let mut inner = self.inner.lock().expect("bus lock poisoned");
        match channel {
            Some(name) => {
                if let Some(ch) = inner.channels.get_mut(name) {
                    ch.history.clear();
                }
            }
            None => {
                for ch in inner.channels.values_mut() {
                    ch.history.clear();
                }
            }
        }
    }

    /// Names of all channels that have ever been subscribed or published to.
    #[must_use]
    pub fn list_channels(&self) -> Vec<String> {
        let inner = self.inner.lock().expect("bus lock poisoned");
        let mut names: Vec<String> = inner.channels.keys().cloned().collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn subscriber_count(&self, channel: &str) -> usize {
        let inner = self.inner.lock().expect("bus lock poisoned");
        inner
            .channels
            .get(channel)
            .map_or(0, |ch| ch.subscribers.len())
    }
}
