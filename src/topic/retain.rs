//! Retained message tree
//!
//! Stores at most one retained message per exact topic name. Nodes are keyed
//! by literal levels only; wildcards come from the subscribing filter when
//! messages are replayed.

use bytes::Bytes;

use super::error::Result;
use super::path::TopicPath;
use super::trie::TopicTrie;
use crate::protocol::QoS;

/// Retained message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetainedMessage {
    pub payload: Bytes,
    pub qos: QoS,
}

/// Trie of topic names to their retained message
#[derive(Debug, Default)]
pub struct RetainTree {
    trie: TopicTrie<Option<RetainedMessage>>,
    /// Maximum levels per topic or filter (0 = unlimited)
    max_topic_levels: usize,
    /// Number of stored messages
    count: usize,
}

impl RetainTree {
    pub fn new() -> Self {
        Self::with_max_levels(0)
    }

    pub fn with_max_levels(max_topic_levels: usize) -> Self {
        Self {
            trie: TopicTrie::new(),
            max_topic_levels,
            count: 0,
        }
    }

    /// Store or clear the retained message for a topic.
    ///
    /// An empty payload clears whatever is stored at `topic`; anything else
    /// replaces it.
    pub fn retain(&mut self, topic: &str, payload: Bytes, qos: QoS) -> Result<()> {
        let path = TopicPath::parse_name(topic, self.max_topic_levels)?;

        if payload.is_empty() {
            let cleared = self
                .trie
                .update(path.levels(), Option::take)
                .flatten()
                .is_some();
            if cleared {
                self.count -= 1;
            }
        } else {
            let slot = self.trie.get_or_insert(path.levels());
            if slot.replace(RetainedMessage { payload, qos }).is_none() {
                self.count += 1;
            }
        }

        Ok(())
    }

    /// Retained message stored at exactly `topic`
    pub fn get(&self, topic: &str) -> Option<&RetainedMessage> {
        let path = TopicPath::parse_name(topic, self.max_topic_levels).ok()?;
        self.trie.get(path.levels())?.as_ref()
    }

    /// Call `deliver` for every retained message matched by `filter`.
    ///
    /// Each message is reported with its topic and the QoS it should be sent
    /// at: the lower of the stored QoS and `client_qos`.
    pub fn publish_retained<F>(&self, filter: &str, client_qos: QoS, mut deliver: F) -> Result<()>
    where
        F: FnMut(&str, &Bytes, QoS),
    {
        let path = TopicPath::parse_filter(filter, self.max_topic_levels)?;

        self.trie.matches_filter(path.levels(), |levels, slot| {
            if let Some(message) = slot {
                let topic = levels.join("/");
                deliver(&topic, &message.payload, message.qos.min(client_qos));
            }
        });

        Ok(())
    }

    /// Number of stored messages
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
