//! MQTT Session Management
//!
//! Tracks which client ids have a session and whether that session is
//! currently bound to a live connection.
//!
//! A client id is in one of three states:
//! - Active: bound to a connection
//! - Persisted: no connection, but identity, subscriptions and queued
//!   messages survive until the client returns (clean_session = false)
//! - Absent: no record at all
//!
//! Every binding to a connection gets a fresh [`SessionToken`]. Teardown
//! requests carrying an older token refer to a connection that no longer
//! owns the session and are ignored.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;
use bytes::Bytes;

use crate::broker::{BrokerError, Connection};
use crate::protocol::{Publish, QoS};

type Result<T> = std::result::Result<T, BrokerError>;

/// Generation handle identifying one binding of a session to a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionToken(u64);

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Bound to a live connection
    Active,
    /// Kept for a returning client, no connection
    Persisted,
}

/// Will message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WillMessage {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
}

struct Link {
    token: SessionToken,
    connection: Arc<dyn Connection>,
}

/// Client session
pub struct Session {
    /// Client identifier
    pub client_id: Arc<str>,
    /// Clean session flag from the CONNECT that created the current binding
    pub clean_session: bool,
    /// Will message, published if the connection is lost
    pub will: Option<WillMessage>,
    link: Option<Link>,
    /// Pending messages (queued while disconnected)
    pending_messages: VecDeque<Publish>,
    /// Maximum pending messages (0 = no queueing)
    max_pending_messages: usize,
}

impl Session {
    fn new(client_id: Arc<str>, link: Link, max_pending_messages: usize) -> Self {
        Self {
            client_id,
            clean_session: true,
            will: None,
            link: Some(link),
            pending_messages: VecDeque::new(),
            max_pending_messages,
        }
    }

    pub fn state(&self) -> SessionState {
        if self.link.is_some() {
            SessionState::Active
        } else {
            SessionState::Persisted
        }
    }

    /// Token of the current binding, if active
    pub fn token(&self) -> Option<SessionToken> {
        self.link.as_ref().map(|l| l.token)
    }

    /// Connection of the current binding, if active
    pub fn connection(&self) -> Option<&Arc<dyn Connection>> {
        self.link.as_ref().map(|l| &l.connection)
    }

    /// Queue a message for later delivery.
    ///
    /// Returns false when queueing is disabled. A full queue drops its
    /// oldest entry, so a depth of one keeps only the latest message.
    pub fn queue_message(&mut self, publish: Publish) -> bool {
        if self.max_pending_messages == 0 {
            return false;
        }
        if self.pending_messages.len() >= self.max_pending_messages {
            // Drop oldest message
            self.pending_messages.pop_front();
        }
        self.pending_messages.push_back(publish);
        true
    }

    /// Get and remove pending messages
    pub fn drain_pending_messages(&mut self) -> VecDeque<Publish> {
        std::mem::take(&mut self.pending_messages)
    }

    pub fn pending_len(&self) -> usize {
        self.pending_messages.len()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("client_id", &self.client_id)
            .field("state", &self.state())
            .field("token", &self.token())
            .field("clean_session", &self.clean_session)
            .field("pending", &self.pending_messages.len())
            .finish()
    }
}

/// Client id -> session record
pub struct SessionRegistry {
    sessions: AHashMap<Arc<str>, Session>,
    next_generation: u64,
    max_queued_messages: usize,
}

impl SessionRegistry {
    pub fn new(max_queued_messages: usize) -> Self {
        Self {
            sessions: AHashMap::new(),
            next_generation: 1,
            max_queued_messages,
        }
    }

    fn next_token(&mut self) -> SessionToken {
        let token = SessionToken(self.next_generation);
        self.next_generation += 1;
        token
    }

    pub fn state(&self, client_id: &str) -> Option<SessionState> {
        self.sessions.get(client_id).map(Session::state)
    }

    pub fn has_active_session(&self, client_id: &str) -> bool {
        self.state(client_id) == Some(SessionState::Active)
    }

    pub fn has_persisted_session(&self, client_id: &str) -> bool {
        self.state(client_id) == Some(SessionState::Persisted)
    }

    /// Create an active session for a client id.
    ///
    /// A persisted record for the same id is replaced; the caller is
    /// responsible for dropping its subscriptions.
    pub fn new_session(
        &mut self,
        client_id: Arc<str>,
        connection: Arc<dyn Connection>,
    ) -> Result<SessionToken> {
        if self.has_active_session(&client_id) {
            return Err(BrokerError::DuplicateActiveSession(client_id));
        }

        let token = self.next_token();
        let link = Link { token, connection };
        self.sessions.insert(
            client_id.clone(),
            Session::new(client_id, link, self.max_queued_messages),
        );
        Ok(token)
    }

    /// Bind a persisted session to a new connection.
    ///
    /// Returns the new token and whatever was queued while offline.
    pub fn renew_session(
        &mut self,
        client_id: &str,
        connection: Arc<dyn Connection>,
    ) -> Result<(SessionToken, VecDeque<Publish>)> {
        let token = SessionToken(self.next_generation);
        let session = self
            .sessions
            .get_mut(client_id)
            .ok_or_else(|| BrokerError::UnknownClient(client_id.into()))?;

        if session.link.is_some() {
            return Err(BrokerError::DuplicateActiveSession(
                session.client_id.clone(),
            ));
        }

        session.link = Some(Link { token, connection });
        let pending = session.drain_pending_messages();
        self.next_generation += 1;
        Ok((token, pending))
    }

    /// Unbind an active session from its connection, keeping the record
    pub fn retain_session(&mut self, client_id: &str) -> Result<()> {
        let session = self
            .sessions
            .get_mut(client_id)
            .ok_or_else(|| BrokerError::UnknownClient(client_id.into()))?;

        session.link = None;
        Ok(())
    }

    /// Remove the session record entirely
    pub fn delete_session(&mut self, client_id: &str) -> Result<Session> {
        self.sessions
            .remove(client_id)
            .ok_or_else(|| BrokerError::UnknownClient(client_id.into()))
    }

    /// Whether `token` is the current binding of `client_id`
    pub fn is_current(&self, client_id: &str, token: SessionToken) -> bool {
        self.sessions
            .get(client_id)
            .and_then(Session::token)
            .is_some_and(|t| t == token)
    }

    pub fn connection(&self, client_id: &str) -> Option<Arc<dyn Connection>> {
        self.sessions
            .get(client_id)
            .and_then(|s| s.connection().cloned())
    }

    pub fn get(&self, client_id: &str) -> Option<&Session> {
        self.sessions.get(client_id)
    }

    pub fn get_mut(&mut self, client_id: &str) -> Option<&mut Session> {
        self.sessions.get_mut(client_id)
    }

    /// Get session count
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Number of sessions bound to a connection
    pub fn active_count(&self) -> usize {
        self.sessions.values().filter(|s| s.link.is_some()).count()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(1)
    }
}
