//! Subscription tree
//!
//! Maps topic filters to the clients subscribed at exactly that filter and
//! fans published topics out to every matching filter node.

use std::sync::Arc;

use ahash::AHashMap;

use super::error::Result;
use super::path::TopicPath;
use super::trie::{TopicTrie, TrieValue};
use crate::protocol::QoS;

/// Clients subscribed at one filter node, with their granted QoS
#[derive(Debug, Default)]
pub struct Subscribers {
    clients: AHashMap<Arc<str>, QoS>,
}

impl Subscribers {
    pub fn get(&self, client_id: &str) -> Option<QoS> {
        self.clients.get(client_id).copied()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Arc<str>, QoS)> {
        self.clients.iter().map(|(id, qos)| (id, *qos))
    }
}

impl TrieValue for Subscribers {
    fn is_vacant(&self) -> bool {
        self.clients.is_empty()
    }
}

/// Trie of topic filters to subscribers
#[derive(Debug)]
pub struct SubscriptionTree {
    trie: TopicTrie<Subscribers>,
    /// Upper bound for granted QoS
    max_qos: QoS,
    /// Maximum levels per filter (0 = unlimited)
    max_topic_levels: usize,
    /// Number of (filter, client) pairs
    count: usize,
}

impl SubscriptionTree {
    pub fn new(max_qos: QoS) -> Self {
        Self::with_max_levels(max_qos, 0)
    }

    pub fn with_max_levels(max_qos: QoS, max_topic_levels: usize) -> Self {
        Self {
            trie: TopicTrie::new(),
            max_qos,
            max_topic_levels,
            count: 0,
        }
    }

    /// Add or update a subscription, returning the granted QoS.
    ///
    /// Re-subscribing the same client to the same filter replaces the QoS in
    /// place.
    pub fn subscribe(&mut self, filter: &str, client_id: &Arc<str>, qos: QoS) -> Result<QoS> {
        let path = TopicPath::parse_filter(filter, self.max_topic_levels)?;
        let granted = qos.min(self.max_qos);

        let subscribers = self.trie.get_or_insert(path.levels());
        let previous = subscribers.clients.insert(client_id.clone(), granted);
        if previous.is_none() {
            self.count += 1;
        }

        Ok(granted)
    }

    /// Remove one subscription; returns whether it existed
    pub fn unsubscribe(&mut self, filter: &str, client_id: &str) -> Result<bool> {
        let path = TopicPath::parse_filter(filter, self.max_topic_levels)?;

        let outcome = self.trie.update(path.levels(), |subscribers| {
            subscribers.clients.remove(client_id).is_some()
        });
        let removed = outcome.unwrap_or(false);

        if removed {
            self.count -= 1;
        }
        Ok(removed)
    }

    /// Remove every subscription held by a client; returns how many were removed
    pub fn unsubscribe_all(&mut self, client_id: &str) -> usize {
        let mut removed = 0;
        self.trie.update_all(|subscribers| {
            if subscribers.clients.remove(client_id).is_some() {
                removed += 1;
            }
        });
        self.count -= removed;
        removed
    }

    /// Call `deliver` once per (matching filter, subscriber) pair.
    ///
    /// A client subscribed through two overlapping filters is reported
    /// twice, once with each granted QoS.
    pub fn publish<F>(&self, topic: &str, mut deliver: F) -> Result<()>
    where
        F: FnMut(&Arc<str>, QoS),
    {
        let path = TopicPath::parse_name(topic, self.max_topic_levels)?;

        self.trie.matches(path.levels(), |subscribers| {
            for (client_id, qos) in subscribers.iter() {
                deliver(client_id, qos);
            }
        });

        Ok(())
    }

    /// Filters a client is currently subscribed to, with their granted QoS
    pub fn filters_for(&self, client_id: &str) -> Vec<(String, QoS)> {
        let mut filters = Vec::new();
        self.trie.walk(|path, subscribers| {
            if let Some(qos) = subscribers.get(client_id) {
                filters.push((path.join("/"), qos));
            }
        });
        filters
    }

    /// Subscribers stored at exactly `filter`
    pub fn subscribers(&self, filter: &str) -> Option<&Subscribers> {
        let path = TopicPath::parse_filter(filter, self.max_topic_levels).ok()?;
        self.trie.get(path.levels())
    }

    pub fn max_qos(&self) -> QoS {
        self.max_qos
    }

    /// Number of (filter, client) pairs
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of trie nodes, root included
    pub fn node_count(&self) -> usize {
        self.trie.node_count()
    }
}

impl Default for SubscriptionTree {
    fn default() -> Self {
        Self::new(QoS::ExactlyOnce)
    }
}
