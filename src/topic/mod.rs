//! Topic matching, subscription and retained message trees
//!
//! Implements topic name/filter validation and a generic topic trie shared by
//! the subscription tree (filters -> subscribers) and the retained message
//! tree (topic names -> last retained message).
//!
//! The trees do no locking of their own; the broker guards both of them with
//! one lock together with the session registry.

mod error;
mod path;
mod retain;
mod subscription;
mod trie;
pub mod validation;

pub use error::{Result, TopicError};
pub use path::{
    matches, split, topic_matches_filter, TopicLevel, TopicPath, MULTI_WILDCARD, SINGLE_WILDCARD,
};
pub use retain::{RetainTree, RetainedMessage};
pub use subscription::{Subscribers, SubscriptionTree};
pub use trie::{TopicTrie, TrieValue};
pub use validation::{
    validate_topic_filter, validate_topic_filter_with_max_levels, validate_topic_name,
    validate_topic_name_with_max_levels,
};
