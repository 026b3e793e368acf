//! Subscription registry
//!
//! Reference-counted map from topic to interested consumers. A topic is
//! present iff its consumer set is non-empty. The registry never touches the
//! transport; on the empty/non-empty transitions it emits an `Intent` that
//! the connection manager acts on when (and if) it is connected.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use types::ids::ConsumerId;
use types::topic::Topic;

/// Signal to the connection manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Subscribe(Topic),
    Unsubscribe(Topic),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// First consumer: the topic became active.
    Activated,
    /// Topic already active; consumer added.
    Joined,
    /// Consumer was already subscribed.
    AlreadySubscribed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
    /// Last consumer left: the topic was removed.
    Deactivated,
    /// Other consumers remain.
    Left,
    /// Consumer was not subscribed to the topic.
    NotSubscribed,
}

pub struct SubscriptionRegistry {
    topics: Mutex<BTreeMap<Topic, BTreeSet<ConsumerId>>>,
    intents: mpsc::UnboundedSender<Intent>,
}

impl SubscriptionRegistry {
    /// Create a registry and the receiving end of its intent channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Intent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                topics: Mutex::new(BTreeMap::new()),
                intents: tx,
            },
            rx,
        )
    }

    pub fn subscribe(&self, topic: Topic, consumer: ConsumerId) -> SubscribeOutcome {
        let mut topics = self.topics.lock();
        let consumers = topics.entry(topic.clone()).or_default();
        let was_empty = consumers.is_empty();

        if !consumers.insert(consumer.clone()) {
            return SubscribeOutcome::AlreadySubscribed;
        }

        if was_empty {
            info!(topic = %topic, consumer = %consumer, "Topic activated");
            // Sent under the lock so intents arrive in transition order.
            self.emit(Intent::Subscribe(topic));
            SubscribeOutcome::Activated
        } else {
            debug!(topic = %topic, consumer = %consumer, consumers = consumers.len(), "Consumer joined");
            SubscribeOutcome::Joined
        }
    }

    pub fn unsubscribe(&self, topic: &Topic, consumer: &ConsumerId) -> UnsubscribeOutcome {
        let mut topics = self.topics.lock();
        let Some(consumers) = topics.get_mut(topic) else {
            return UnsubscribeOutcome::NotSubscribed;
        };

        if !consumers.remove(consumer) {
            return UnsubscribeOutcome::NotSubscribed;
        }

        if consumers.is_empty() {
            topics.remove(topic);
            info!(topic = %topic, consumer = %consumer, "Topic deactivated");
            self.emit(Intent::Unsubscribe(topic.clone()));
            UnsubscribeOutcome::Deactivated
        } else {
            debug!(topic = %topic, consumer = %consumer, consumers = consumers.len(), "Consumer left");
            UnsubscribeOutcome::Left
        }
    }

    /// Active topics in deterministic order.
    pub fn topics(&self) -> Vec<Topic> {
        self.topics.lock().keys().cloned().collect()
    }

    pub fn contains(&self, topic: &Topic) -> bool {
        self.topics.lock().contains_key(topic)
    }

    pub fn len(&self) -> usize {
        self.topics.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.lock().is_empty()
    }

    fn emit(&self, intent: Intent) {
        if let Err(e) = self.intents.send(intent) {
            warn!(intent = ?e.0, "Connection manager is gone, intent dropped");
        }
    }
}
