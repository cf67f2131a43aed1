//! Connection registry: identity and session membership per live connection.

use std::fmt;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::protocol::ServerMessage;

/// Queue feeding one connection's outbound socket task.
pub type OutboundSender = mpsc::UnboundedSender<ServerMessage>;

/// Opaque identifier for one live transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// State kept for one live connection.
#[derive(Debug)]
pub struct Connection {
    /// Identity shown to other clients; generated at connect time.
    pub user_id: Uuid,
    /// Session currently joined, if any. Set only after the connection has
    /// been recorded as a member of that session.
    pub session_id: Option<String>,
    /// Display name, updated on each join.
    pub username: String,
    /// When the connection was registered.
    pub connected_at: DateTime<Utc>,
    /// Outbound queue for this connection.
    pub tx: OutboundSender,
}

/// Sender identity injected into relayed payloads.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: Uuid,
    pub username: String,
}

/// Registry of live connections, keyed by connection id.
///
/// All mutation goes through these methods; the underlying map is never
/// exposed. Methods never hold a map guard across a call into another
/// registry.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    conns: DashMap<ConnectionId, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            conns: DashMap::new(),
        }
    }

    /// Register a new connection and generate its user id.
    pub fn register(&self, id: ConnectionId, tx: OutboundSender) -> Uuid {
        let user_id = Uuid::new_v4();
        self.conns.insert(
            id,
            Connection {
                user_id,
                session_id: None,
                username: "Anonymous".to_string(),
                connected_at: Utc::now(),
                tx,
            },
        );
        user_id
    }

    /// Remove a connection, returning its record. `None` if already gone.
    pub fn remove(&self, id: ConnectionId) -> Option<Connection> {
        self.conns.remove(&id).map(|(_, conn)| conn)
    }

    /// Outbound sender for a connection.
    pub fn sender(&self, id: ConnectionId) -> Option<OutboundSender> {
        self.conns.get(&id).map(|c| c.tx.clone())
    }

    /// The session a connection is currently joined to.
    pub fn session_of(&self, id: ConnectionId) -> Option<String> {
        self.conns.get(&id).and_then(|c| c.session_id.clone())
    }

    /// Sender identity for payload annotation.
    pub fn identity(&self, id: ConnectionId) -> Option<Identity> {
        self.conns.get(&id).map(|c| Identity {
            user_id: c.user_id,
            username: c.username.clone(),
        })
    }

    /// Record a completed join: membership first, then this.
    pub fn set_session(&self, id: ConnectionId, session_id: &str, username: &str) {
        if let Some(mut conn) = self.conns.get_mut(&id) {
            conn.session_id = Some(session_id.to_string());
            conn.username = username.to_string();
        }
    }

    pub fn len(&self) -> usize {
        self.conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    /// Drop every connection record.
    pub fn clear(&self) {
        self.conns.clear();
    }
}
