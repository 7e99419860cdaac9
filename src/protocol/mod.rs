//! Protocol types shared with the connection layer
//!
//! The packet codec lives outside this crate; the core only needs the QoS
//! levels and the shape of an outbound PUBLISH.

use std::sync::Arc;

use bytes::Bytes;

/// Quality of Service levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum QoS {
    /// At most once delivery
    #[default]
    AtMostOnce = 0,
    /// At least once delivery
    AtLeastOnce = 1,
    /// Exactly once delivery
    ExactlyOnce = 2,
}

impl QoS {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(QoS::AtMostOnce),
            1 => Some(QoS::AtLeastOnce),
            2 => Some(QoS::ExactlyOnce),
            _ => None,
        }
    }

    /// Returns the minimum of two QoS levels (for subscription matching)
    pub fn min(self, other: Self) -> Self {
        if (self as u8) < (other as u8) {
            self
        } else {
            other
        }
    }
}

/// An outbound PUBLISH handed to a connection.
///
/// Packet identifiers are assigned by the connection when it encodes the
/// packet; `dup` is carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
    pub topic: Arc<str>,
    pub payload: Bytes,
}

impl Publish {
    pub fn new(topic: impl Into<Arc<str>>, payload: Bytes, qos: QoS, retain: bool) -> Self {
        Self {
            dup: false,
            qos,
            retain,
            topic: topic.into(),
            payload,
        }
    }
}
