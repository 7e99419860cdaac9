//! VibeMQ Core - session registry and topic routing for an MQTT broker
//!
//! The broker core keeps track of client sessions, subscriptions and
//! retained messages, and routes published messages to the connections of
//! matching subscribers. Packet codecs and transports live outside this
//! crate and talk to it through [`Broker`] and the [`Connection`] trait.

pub mod broker;
pub mod config;
pub mod logging;
pub mod protocol;
pub mod session;
pub mod topic;

pub use broker::{
    Broker, BrokerConfig, BrokerError, ChannelConnection, ConnectAck, ConnectRequest, Connection,
    ReleaseReason, SendError,
};
pub use config::Config;
pub use protocol::{Publish, QoS};
pub use session::{SessionState, SessionToken, WillMessage};
pub use topic::TopicError;
