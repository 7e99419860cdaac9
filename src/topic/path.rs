//! Topic path model
//!
//! A topic is split on `/` into an ordered list of levels. Leading and
//! trailing separators produce empty levels, so `/a` is `["", "a"]` and
//! `a/` is `["a", ""]`.

use smallvec::SmallVec;

use super::error::{Result, TopicError};
use super::validation;

/// Single-level wildcard token
pub const SINGLE_WILDCARD: &str = "+";
/// Multi-level wildcard token
pub const MULTI_WILDCARD: &str = "#";

/// Represents a level in a topic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicLevel<'a> {
    /// Normal topic level
    Normal(&'a str),
    /// Single-level wildcard (+)
    SingleWildcard,
    /// Multi-level wildcard (#)
    MultiWildcard,
}

impl<'a> From<&'a str> for TopicLevel<'a> {
    fn from(level: &'a str) -> Self {
        match level {
            SINGLE_WILDCARD => TopicLevel::SingleWildcard,
            MULTI_WILDCARD => TopicLevel::MultiWildcard,
            s => TopicLevel::Normal(s),
        }
    }
}

/// A topic or filter split into its levels.
///
/// Borrowed from the string it was parsed from and never stored; the trees
/// copy the levels they keep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPath<'a> {
    levels: SmallVec<[&'a str; 8]>,
}

impl<'a> TopicPath<'a> {
    /// Split and validate a topic name (PUBLISH, retain)
    pub fn parse_name(topic: &'a str, max_levels: usize) -> Result<Self> {
        validation::validate_topic_name_with_max_levels(topic, max_levels)?;
        split(topic)
    }

    /// Split and validate a topic filter (SUBSCRIBE, UNSUBSCRIBE)
    pub fn parse_filter(filter: &'a str, max_levels: usize) -> Result<Self> {
        validation::validate_topic_filter_with_max_levels(filter, max_levels)?;
        Ok(Self {
            levels: filter.split('/').collect(),
        })
    }

    pub fn levels(&self) -> &[&'a str] {
        &self.levels
    }
}

/// Split a topic string into levels.
///
/// Only the empty string is rejected; wildcard and length rules are
/// enforced by [`TopicPath::parse_name`] and [`TopicPath::parse_filter`].
pub fn split(topic: &str) -> Result<TopicPath<'_>> {
    if topic.is_empty() {
        return Err(TopicError::InvalidTopic("topic cannot be empty"));
    }
    Ok(TopicPath {
        levels: topic.split('/').collect(),
    })
}

/// Check whether filter levels match topic levels.
///
/// - a literal level must equal the topic level exactly
/// - `+` matches exactly one non-empty level
/// - `#` matches the remaining zero or more levels and must come last
pub fn matches(filter: &[&str], topic: &[&str]) -> bool {
    let mut ti = 0;

    for (fi, level) in filter.iter().enumerate() {
        match TopicLevel::from(*level) {
            TopicLevel::MultiWildcard => return fi + 1 == filter.len(),
            TopicLevel::SingleWildcard => match topic.get(ti) {
                Some(t) if !t.is_empty() => ti += 1,
                _ => return false,
            },
            TopicLevel::Normal(literal) => {
                if topic.get(ti) != Some(&literal) {
                    return false;
                }
                ti += 1;
            }
        }
    }

    ti == topic.len()
}

/// Check if a topic filter matches a topic name
pub fn topic_matches_filter(topic: &str, filter: &str) -> bool {
    let topic_levels: SmallVec<[&str; 8]> = topic.split('/').collect();
    let filter_levels: SmallVec<[&str; 8]> = filter.split('/').collect();
    matches(&filter_levels, &topic_levels)
}
