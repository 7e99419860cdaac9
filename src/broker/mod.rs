//! MQTT Broker Core
//!
//! The broker facade composes the subscription tree, the retained message
//! tree and the session registry behind the calls a connection handler
//! makes. All three live under one lock so every operation is atomic with
//! respect to the others; deliveries are collected while the lock is held
//! and handed to connections after it is released.

mod connect;
mod connection;
mod error;

pub use connect::{generate_client_id, ConnectAck, ConnectRequest, ReleaseReason};
pub use connection::{ChannelConnection, Connection, SendError};
pub use error::{BrokerError, Result};

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, MutexGuard};
use smallvec::SmallVec;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::config::Config;
use crate::protocol::{Publish, QoS};
use crate::session::{SessionRegistry, SessionState, SessionToken};
use crate::topic::{validate_topic_name_with_max_levels, RetainTree, SubscriptionTree};

/// Broker configuration
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Maximum QoS granted to subscriptions
    pub max_qos: QoS,
    /// Retain available
    pub retain_available: bool,
    /// Maximum levels per topic or filter (0 = unlimited)
    pub max_topic_levels: usize,
    /// Maximum queued messages per persisted session (0 = no queueing)
    pub max_queued_messages: usize,
    /// Capacity of connections created by [`Broker::channel_connection`]
    pub outbound_channel_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            max_qos: QoS::ExactlyOnce,
            retain_available: true,
            max_topic_levels: 0,
            max_queued_messages: 1,
            outbound_channel_capacity: 1024,
        }
    }
}

impl From<&Config> for BrokerConfig {
    fn from(config: &Config) -> Self {
        Self {
            max_qos: QoS::from_u8(config.mqtt.max_qos).unwrap_or(QoS::ExactlyOnce),
            retain_available: config.mqtt.retain_available,
            max_topic_levels: config.limits.max_topic_levels,
            max_queued_messages: config.limits.max_queued_messages,
            outbound_channel_capacity: config.limits.outbound_channel_capacity,
        }
    }
}

/// Deliveries collected under the lock, sent after it is released
type Outbound = SmallVec<[(Arc<dyn Connection>, Publish); 16]>;

/// Everything guarded by the broker lock
struct BrokerState {
    subscriptions: SubscriptionTree,
    retained: RetainTree,
    sessions: SessionRegistry,
    retain_available: bool,
}

impl BrokerState {
    fn new(config: &BrokerConfig) -> Self {
        Self {
            subscriptions: SubscriptionTree::with_max_levels(
                config.max_qos,
                config.max_topic_levels,
            ),
            retained: RetainTree::with_max_levels(config.max_topic_levels),
            sessions: SessionRegistry::new(config.max_queued_messages),
            retain_available: config.retain_available,
        }
    }

    fn subscribe(
        &mut self,
        filter: &str,
        client_id: &str,
        qos: QoS,
        outbound: &mut Outbound,
    ) -> Result<QoS> {
        let session = self
            .sessions
            .get(client_id)
            .ok_or_else(|| BrokerError::UnknownClient(client_id.into()))?;
        let client = session.client_id.clone();
        let connection = session.connection().cloned();

        let granted = self.subscriptions.subscribe(filter, &client, qos)?;

        if let Some(connection) = connection {
            self.replay_retained(filter, granted, &connection, outbound)?;
        }

        Ok(granted)
    }

    /// Queue every retained message matched by `filter` for one connection
    fn replay_retained(
        &self,
        filter: &str,
        qos: QoS,
        connection: &Arc<dyn Connection>,
        outbound: &mut Outbound,
    ) -> Result<()> {
        if !self.retain_available {
            return Ok(());
        }

        self.retained
            .publish_retained(filter, qos, |topic, payload, qos| {
                trace!("Replaying retained {} for {}", topic, filter);
                let publish = Publish::new(topic, payload.clone(), qos, true);
                outbound.push((connection.clone(), publish));
            })?;
        Ok(())
    }

    fn publish(
        &mut self,
        topic: &str,
        payload: Bytes,
        qos: QoS,
        retain: bool,
        outbound: &mut Outbound,
    ) -> Result<()> {
        let BrokerState {
            subscriptions,
            retained,
            sessions,
            retain_available,
        } = self;

        let shared_topic: Arc<str> = Arc::from(topic);
        let mut queued = 0usize;

        subscriptions.publish(topic, |client_id, granted| {
            let publish = Publish {
                dup: false,
                qos: qos.min(granted),
                retain: false,
                topic: shared_topic.clone(),
                payload: payload.clone(),
            };

            let Some(session) = sessions.get_mut(client_id) else {
                trace!("No session for {}, dropping {}", client_id, topic);
                return;
            };

            if let Some(connection) = session.connection().cloned() {
                outbound.push((connection, publish));
            } else if publish.qos > QoS::AtMostOnce && session.queue_message(publish) {
                queued += 1;
            }
        })?;

        if queued > 0 {
            debug!("Queued {} message(s) on {}", queued, topic);
        }

        if retain && *retain_available {
            retained.retain(topic, payload, qos)?;
        }

        Ok(())
    }

    fn new_session(
        &mut self,
        client_id: &str,
        connection: Arc<dyn Connection>,
    ) -> Result<SessionToken> {
        if self.sessions.has_persisted_session(client_id) {
            let removed = self.subscriptions.unsubscribe_all(client_id);
            debug!(
                "Discarding persisted session for {} ({} subscriptions)",
                client_id, removed
            );
        }

        let token = self.sessions.new_session(client_id.into(), connection)?;
        debug!("New session for {} ({})", client_id, token);
        Ok(token)
    }

    /// Bind a persisted session to `connection`, replaying retained messages
    /// for its filters and then the messages queued while it was offline
    fn renew_session(
        &mut self,
        client_id: &str,
        connection: Arc<dyn Connection>,
        outbound: &mut Outbound,
    ) -> Result<SessionToken> {
        let (token, pending) = self.sessions.renew_session(client_id, connection.clone())?;
        debug!(
            "Renewed session for {} ({}, {} pending)",
            client_id,
            token,
            pending.len()
        );

        for (filter, qos) in self.subscriptions.filters_for(client_id) {
            self.replay_retained(&filter, qos, &connection, outbound)?;
        }

        for publish in pending {
            outbound.push((connection.clone(), publish));
        }

        Ok(token)
    }

    fn retain_session(&mut self, client_id: &str) -> Result<()> {
        self.sessions.retain_session(client_id)?;
        debug!("Retained session for {}", client_id);
        Ok(())
    }

    fn delete_session(&mut self, client_id: &str) -> Result<()> {
        self.sessions.delete_session(client_id)?;
        let removed = self.subscriptions.unsubscribe_all(client_id);
        debug!(
            "Deleted session for {} ({} subscriptions)",
            client_id, removed
        );
        Ok(())
    }
}

/// The MQTT Broker
///
/// Constructed explicitly and shared with connection handlers behind an
/// `Arc`; independent instances do not interact.
///
/// Deliveries are handed to [`Connection::send_publish`] after the state
/// lock is released but while the delivery lock is held, so a connection
/// sees batches in the order the broker produced them. Implementations of
/// `send_publish` must therefore not call back into the broker.
pub struct Broker {
    /// Configuration
    config: BrokerConfig,
    /// Subscriptions, retained messages and sessions
    state: Mutex<BrokerState>,
    /// Held while a batch of deliveries is sent
    delivery: Mutex<()>,
}

impl Broker {
    pub fn new(config: BrokerConfig) -> Self {
        let state = Mutex::new(BrokerState::new(&config));
        Self {
            config,
            state,
            delivery: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Create a channel-backed connection sized by the configured capacity
    pub fn channel_connection(&self) -> (ChannelConnection, mpsc::Receiver<Publish>) {
        ChannelConnection::channel(self.config.outbound_channel_capacity)
    }

    /// Release the state lock and hand the collected deliveries over.
    ///
    /// The delivery lock is taken before `state` is released. A later batch
    /// therefore cannot overtake this one, even though the sends themselves
    /// run outside the state lock. A failed send only loses that delivery.
    fn deliver(&self, state: MutexGuard<'_, BrokerState>, outbound: Outbound) {
        if outbound.is_empty() {
            return;
        }
        let _order = self.delivery.lock();
        drop(state);

        for (connection, publish) in outbound {
            let topic = publish.topic.clone();
            if let Err(e) = connection.send_publish(publish) {
                debug!("Dropped delivery on {}: {}", topic, e);
            }
        }
    }

    /// Subscribe a client to a filter and replay matching retained messages.
    ///
    /// Returns the granted QoS, the lower of `qos` and the broker maximum.
    pub fn subscribe(&self, filter: &str, client_id: &str, qos: QoS) -> Result<QoS> {
        let mut outbound = Outbound::new();
        let mut state = self.state.lock();
        let granted = state.subscribe(filter, client_id, qos, &mut outbound)?;

        let replayed = outbound.len();
        self.deliver(state, outbound);

        debug!(
            "SUBSCRIBE {} to {} (granted {:?}, {} retained)",
            client_id, filter, granted, replayed
        );
        Ok(granted)
    }

    /// Remove one subscription; returns whether it existed
    pub fn unsubscribe(&self, filter: &str, client_id: &str) -> Result<bool> {
        let mut state = self.state.lock();
        let removed = state.subscriptions.unsubscribe(filter, client_id)?;
        drop(state);

        debug!("UNSUBSCRIBE {} from {} ({})", client_id, filter, removed);
        Ok(removed)
    }

    /// Remove every subscription held by a client
    pub fn unsubscribe_all(&self, client_id: &str) -> usize {
        self.state.lock().subscriptions.unsubscribe_all(client_id)
    }

    /// Route a message to every matching subscription.
    ///
    /// Active subscribers receive it at the lower of the published and the
    /// granted QoS. Persisted sessions queue it when that QoS is above 0.
    /// With `retain` set the retained message for `topic` is replaced, or
    /// cleared when `payload` is empty.
    pub fn publish(&self, topic: &str, payload: Bytes, qos: QoS, retain: bool) -> Result<()> {
        let mut outbound = Outbound::new();
        let mut state = self.state.lock();
        state.publish(topic, payload, qos, retain, &mut outbound)?;

        trace!("PUBLISH {} to {} subscriber(s)", topic, outbound.len());
        self.deliver(state, outbound);
        Ok(())
    }

    /// Store or clear the retained message for a topic without routing it
    pub fn retain(&self, topic: &str, payload: Bytes, qos: QoS) -> Result<()> {
        let mut state = self.state.lock();
        if !state.retain_available {
            validate_topic_name_with_max_levels(topic, self.config.max_topic_levels)?;
            debug!("Retain unavailable, dropping retained {}", topic);
            return Ok(());
        }
        state.retained.retain(topic, payload, qos)?;
        Ok(())
    }

    pub fn has_active_session(&self, client_id: &str) -> bool {
        self.state.lock().sessions.has_active_session(client_id)
    }

    pub fn has_persisted_session(&self, client_id: &str) -> bool {
        self.state.lock().sessions.has_persisted_session(client_id)
    }

    pub fn session_state(&self, client_id: &str) -> Option<SessionState> {
        self.state.lock().sessions.state(client_id)
    }

    /// Create an active session for a fresh client id.
    ///
    /// A persisted session under the same id is discarded together with its
    /// subscriptions. Fails with `DuplicateActiveSession` if the id is
    /// already active; the existing connection is kept.
    pub fn new_session(
        &self,
        client_id: &str,
        connection: Arc<dyn Connection>,
    ) -> Result<SessionToken> {
        self.state.lock().new_session(client_id, connection)
    }

    /// Bind a persisted session to a new connection.
    ///
    /// Retained messages matching the session's filters are delivered first,
    /// then the messages queued while the client was offline.
    pub fn renew_session(
        &self,
        client_id: &str,
        connection: Arc<dyn Connection>,
    ) -> Result<SessionToken> {
        let mut outbound = Outbound::new();
        let mut state = self.state.lock();
        let token = state.renew_session(client_id, connection, &mut outbound)?;
        self.deliver(state, outbound);
        Ok(token)
    }

    /// Unbind an active session from its connection, keeping subscriptions
    pub fn retain_session(&self, client_id: &str) -> Result<()> {
        self.state.lock().retain_session(client_id)
    }

    /// Drop a session and all of its subscriptions
    pub fn delete_session(&self, client_id: &str) -> Result<()> {
        self.state.lock().delete_session(client_id)
    }

    /// Live connection of a client, if its session is active
    pub fn connection(&self, client_id: &str) -> Option<Arc<dyn Connection>> {
        self.state.lock().sessions.connection(client_id)
    }

    /// Get session count
    pub fn session_count(&self) -> usize {
        self.state.lock().sessions.len()
    }

    /// Number of sessions bound to a connection
    pub fn active_session_count(&self) -> usize {
        self.state.lock().sessions.active_count()
    }

    /// Number of (filter, client) subscriptions
    pub fn subscription_count(&self) -> usize {
        self.state.lock().subscriptions.len()
    }

    /// Get retained message count
    pub fn retained_count(&self) -> usize {
        self.state.lock().retained.len()
    }

    /// Filters a client is subscribed to, with their granted QoS
    pub fn subscriptions_of(&self, client_id: &str) -> Vec<(String, QoS)> {
        self.state.lock().subscriptions.filters_for(client_id)
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(BrokerConfig::default())
    }
}
