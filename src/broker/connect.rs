//! CONNECT and teardown handling
//!
//! Maps the clean session flag of a CONNECT onto the session registry and
//! decides what happens to a session when its connection goes away.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use super::{Broker, BrokerError, Connection, Outbound, Result};
use crate::session::{SessionState, SessionToken, WillMessage};
use crate::topic::validate_topic_name_with_max_levels;

/// Session-relevant fields of a CONNECT packet
#[derive(Debug, Clone, Default)]
pub struct ConnectRequest {
    /// Client identifier, empty to let the broker assign one
    pub client_id: String,
    pub clean_session: bool,
    pub will: Option<WillMessage>,
}

impl ConnectRequest {
    pub fn new(client_id: impl Into<String>, clean_session: bool) -> Self {
        Self {
            client_id: client_id.into(),
            clean_session,
            will: None,
        }
    }

    pub fn with_will(mut self, will: WillMessage) -> Self {
        self.will = Some(will);
        self
    }
}

/// Outcome of a successful CONNECT
#[derive(Debug, Clone)]
pub struct ConnectAck {
    /// Client identifier the session is stored under
    pub client_id: Arc<str>,
    /// Token the connection must present when it goes away
    pub token: SessionToken,
    /// Whether a persisted session was resumed
    pub session_present: bool,
}

/// Why a connection released its session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseReason {
    /// Client sent DISCONNECT; the will is discarded
    Disconnect,
    /// Network error, keep-alive timeout or protocol violation; the will is published
    ConnectionLost,
}

/// Generate a client identifier for a CONNECT with an empty one
pub fn generate_client_id() -> String {
    format!("vibemq-{}", Uuid::new_v4().simple())
}

impl Broker {
    /// Establish the session for a CONNECT.
    ///
    /// Resumes a persisted session when `clean_session` is false, otherwise
    /// starts a fresh one. A client id with an active session is rejected.
    pub fn init_session(
        &self,
        request: ConnectRequest,
        connection: Arc<dyn Connection>,
    ) -> Result<ConnectAck> {
        let ConnectRequest {
            client_id,
            clean_session,
            will,
        } = request;

        let client_id: Arc<str> = if client_id.is_empty() {
            if !clean_session {
                return Err(BrokerError::ClientIdRejected);
            }
            generate_client_id().into()
        } else {
            client_id.into()
        };

        if let Some(will) = &will {
            validate_topic_name_with_max_levels(&will.topic, self.config.max_topic_levels)?;
        }

        let mut outbound = Outbound::new();
        let mut state = self.state.lock();

        let (token, session_present) = match state.sessions.state(&client_id) {
            Some(SessionState::Active) => {
                warn!("Rejecting CONNECT from {}: already active", client_id);
                return Err(BrokerError::DuplicateActiveSession(client_id));
            }
            Some(SessionState::Persisted) if !clean_session => {
                let token = state.renew_session(&client_id, connection, &mut outbound)?;
                (token, true)
            }
            _ => (state.new_session(&client_id, connection)?, false),
        };

        if let Some(session) = state.sessions.get_mut(&client_id) {
            session.clean_session = clean_session;
            session.will = will;
        }
        self.deliver(state, outbound);

        debug!(
            "CONNECT {} (clean_session: {}, session_present: {})",
            client_id, clean_session, session_present
        );
        Ok(ConnectAck {
            client_id,
            token,
            session_present,
        })
    }

    /// Release the session bound under `token`.
    ///
    /// Returns `false` if the token is stale, i.e. another connection has
    /// taken the session over since. Clean sessions are deleted, others are
    /// persisted. The will is published only on [`ReleaseReason::ConnectionLost`].
    pub fn release_session(
        &self,
        client_id: &str,
        token: SessionToken,
        reason: ReleaseReason,
    ) -> Result<bool> {
        let mut outbound = Outbound::new();
        let mut state = self.state.lock();

        if !state.sessions.is_current(client_id, token) {
            debug!("Stale release of {} ({})", client_id, token);
            return Ok(false);
        }

        let Some(session) = state.sessions.get_mut(client_id) else {
            return Ok(false);
        };
        let clean_session = session.clean_session;
        let will = session.will.take();

        if clean_session {
            state.delete_session(client_id)?;
        } else {
            state.retain_session(client_id)?;
        }

        if reason == ReleaseReason::ConnectionLost {
            if let Some(will) = will {
                debug!("Publishing will of {} on {}", client_id, will.topic);
                state.publish(
                    &will.topic,
                    will.payload,
                    will.qos,
                    will.retain,
                    &mut outbound,
                )?;
            }
        }
        self.deliver(state, outbound);

        debug!("Released session of {} ({:?})", client_id, reason);
        Ok(true)
    }
}
