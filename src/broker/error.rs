//! Broker error types

use std::fmt;
use std::sync::Arc;

use crate::topic::TopicError;

/// Errors surfaced by broker operations.
///
/// Every failing operation leaves broker state unchanged; the connection
/// layer decides whether to close the offending connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// Malformed topic name
    InvalidTopic(&'static str),
    /// Malformed topic filter
    InvalidFilter(&'static str),
    /// CONNECT with a client id whose session is already active
    DuplicateActiveSession(Arc<str>),
    /// Operation on a client id without a session record
    UnknownClient(Arc<str>),
    /// Empty client id together with clean_session = false (MQTT-3.1.3-8)
    ClientIdRejected,
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTopic(msg) => write!(f, "invalid topic: {}", msg),
            Self::InvalidFilter(msg) => write!(f, "invalid topic filter: {}", msg),
            Self::DuplicateActiveSession(id) => {
                write!(f, "client id '{}' already has an active session", id)
            }
            Self::UnknownClient(id) => write!(f, "no session for client id '{}'", id),
            Self::ClientIdRejected => write!(f, "empty client id requires clean_session = true"),
        }
    }
}

impl std::error::Error for BrokerError {}

impl From<TopicError> for BrokerError {
    fn from(e: TopicError) -> Self {
        match e {
            TopicError::InvalidTopic(msg) => BrokerError::InvalidTopic(msg),
            TopicError::InvalidFilter(msg) => BrokerError::InvalidFilter(msg),
        }
    }
}

/// Result type for broker operations
pub type Result<T> = std::result::Result<T, BrokerError>;
