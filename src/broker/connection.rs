//! Connection handles
//!
//! The broker never owns sockets. Each live session points at a
//! [`Connection`] supplied by the transport layer, and deliveries are handed
//! to it after the state lock has been released.

use std::fmt;

use tokio::sync::mpsc;

use crate::protocol::Publish;

/// Error when handing a message to a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// Connection is closed
    Closed,
    /// Outbound buffer is full
    Full,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Closed => write!(f, "connection closed"),
            SendError::Full => write!(f, "outbound buffer full"),
        }
    }
}

impl std::error::Error for SendError {}

/// Outbound side of a client connection.
///
/// Implementations must not block; a failed send is reported back and the
/// broker treats it as a dropped delivery. `send_publish` runs under the
/// broker's delivery lock and must not call back into the broker.
pub trait Connection: Send + Sync {
    /// Queue a PUBLISH for the client
    fn send_publish(&self, publish: Publish) -> Result<(), SendError>;
}

/// Connection backed by a bounded tokio channel.
///
/// The transport task owns the receiving end and encodes whatever arrives
/// onto the socket.
#[derive(Debug, Clone)]
pub struct ChannelConnection {
    tx: mpsc::Sender<Publish>,
}

impl ChannelConnection {
    pub fn new(tx: mpsc::Sender<Publish>) -> Self {
        Self { tx }
    }

    /// Create a connection together with the receiver the transport drains
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Publish>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl Connection for ChannelConnection {
    fn send_publish(&self, publish: Publish) -> Result<(), SendError> {
        self.tx.try_send(publish).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }
}
