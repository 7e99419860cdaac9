//! Topic error types

use std::fmt;

/// Errors raised while parsing topic names and topic filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicError {
    /// Malformed topic name (PUBLISH, retain)
    InvalidTopic(&'static str),
    /// Malformed topic filter (SUBSCRIBE, UNSUBSCRIBE)
    InvalidFilter(&'static str),
}

impl fmt::Display for TopicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTopic(msg) => write!(f, "invalid topic: {}", msg),
            Self::InvalidFilter(msg) => write!(f, "invalid topic filter: {}", msg),
        }
    }
}

impl std::error::Error for TopicError {}

/// Result type for topic operations
pub type Result<T> = std::result::Result<T, TopicError>;
