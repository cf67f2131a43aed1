//! Event dispatch and broadcast relay.
//!
//! The [`Hub`] owns both registries and is the single entry point for
//! inbound events. Each transport task calls into it synchronously, one
//! call per inbound message; delivery goes through per-connection outbound
//! queues, so everything a connection sends reaches each recipient in send
//! order.
//!
//! Failure policy: referential absence (unknown connection or session) and
//! missing membership are silent no-ops. A dead recipient queue is skipped
//! without affecting the other recipients. Nothing here returns an error to
//! the triggering client.

use serde_json::{Value, json};
use tracing::{debug, info};

use crate::connection::{ConnectionId, ConnectionRegistry, OutboundSender};
use crate::protocol::{ClientMessage, KEY_USER_ID, KEY_USERNAME, Payload, ServerMessage};
use crate::session::SessionRegistry;

/// Relayed event kinds that carry an opaque payload.
#[derive(Debug, Clone, Copy)]
enum RelayKind {
    Drawing,
    AddObject,
    ModifyObject,
    DeleteObject,
    CursorMove,
}

impl RelayKind {
    /// Drawing and cursor events carry the sender's display name as well
    /// as their user id; object events carry the user id only.
    fn carries_username(self) -> bool {
        matches!(self, RelayKind::Drawing | RelayKind::CursorMove)
    }

    fn message(self, data: Payload) -> ServerMessage {
        match self {
            RelayKind::Drawing => ServerMessage::Drawing { data },
            RelayKind::AddObject => ServerMessage::AddObject { data },
            RelayKind::ModifyObject => ServerMessage::ModifyObject { data },
            RelayKind::DeleteObject => ServerMessage::DeleteObject { data },
            RelayKind::CursorMove => ServerMessage::CursorMove { data },
        }
    }
}

/// Shared state for the relay server: connection registry, session
/// registry and the fan-out logic tying them together.
///
/// Constructed once at startup and handed to every transport task.
/// Methods never hold a guard into one registry while touching the other;
/// the connection registry is always read first.
#[derive(Debug, Default)]
pub struct Hub {
    connections: ConnectionRegistry,
    sessions: SessionRegistry,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            connections: ConnectionRegistry::new(),
            sessions: SessionRegistry::new(),
        }
    }

    /// Register a new connection and tell it its generated identity.
    pub fn connect(&self, tx: OutboundSender) -> ConnectionId {
        let id = ConnectionId::new();
        let user_id = self.connections.register(id, tx);
        self.send_to(
            id,
            ServerMessage::Connected {
                user_id: user_id.to_string(),
                session_id: id.to_string(),
            },
        );
        info!("client connected: {id}");
        id
    }

    /// Tear down a connection. Safe to call more than once; repeated calls
    /// find no record and do nothing.
    pub fn disconnect(&self, id: ConnectionId) {
        let Some(conn) = self.connections.remove(id) else {
            return;
        };
        if let Some(session) = conn.session_id {
            self.sessions.leave(&session, id);
            self.fan_out(
                &session,
                None,
                ServerMessage::UserLeft {
                    user_id: conn.user_id.to_string(),
                    session_id: id.to_string(),
                },
            );
        }
        info!("client disconnected: {id}");
    }

    /// Dispatch one inbound message from a connection.
    pub fn handle(&self, origin: ConnectionId, msg: ClientMessage) {
        match msg {
            ClientMessage::JoinSession {
                session_id,
                username,
            } => self.join_session(origin, &session_id, &username),
            ClientMessage::Drawing { data } => self.relay(origin, RelayKind::Drawing, data),
            ClientMessage::AddObject { data } => self.relay(origin, RelayKind::AddObject, data),
            ClientMessage::ModifyObject { data } => {
                self.relay(origin, RelayKind::ModifyObject, data)
            }
            ClientMessage::DeleteObject { data } => {
                self.relay(origin, RelayKind::DeleteObject, data)
            }
            ClientMessage::CursorMove { data } => self.relay(origin, RelayKind::CursorMove, data),
            ClientMessage::ClearCanvas => self.clear_canvas(origin),
            ClientMessage::SaveCanvas { canvas_state } => self.save_canvas(origin, canvas_state),
        }
    }

    /// Join (or create) a session. A connection already in another session
    /// leaves it first and its former session-mates are notified — the
    /// original server skipped that notification (see DESIGN.md).
    fn join_session(&self, origin: ConnectionId, session_id: &str, username: &str) {
        let Some(identity) = self.connections.identity(origin) else {
            return;
        };
        if let Some(previous) = self.connections.session_of(origin) {
            if previous != session_id {
                self.sessions.leave(&previous, origin);
                self.fan_out(
                    &previous,
                    None,
                    ServerMessage::UserLeft {
                        user_id: identity.user_id.to_string(),
                        session_id: origin.to_string(),
                    },
                );
            }
        }

        // Membership is recorded before the connection's session_id so the
        // two registries never claim a joined connection the session does
        // not know about.
        let outcome = self.sessions.join(session_id, origin);
        self.connections.set_session(origin, session_id, username);

        if let Some(canvas_state) = outcome.canvas_state {
            self.send_to(origin, ServerMessage::LoadCanvas { canvas_state });
        }
        self.fan_out(
            session_id,
            Some(origin),
            ServerMessage::UserJoined {
                user_id: identity.user_id.to_string(),
                username: username.to_string(),
                session_id: origin.to_string(),
                user_count: outcome.user_count,
            },
        );
        self.send_to(
            origin,
            ServerMessage::SessionJoined {
                session_id: session_id.to_string(),
                user_count: outcome.user_count,
            },
        );
        info!("user {username} joined session {session_id}");
    }

    /// Relay an opaque payload to the origin's session-mates, annotated
    /// with the sender's identity. Dropped if the origin is in no session.
    fn relay(&self, origin: ConnectionId, kind: RelayKind, mut data: Payload) {
        let Some(session) = self.connections.session_of(origin) else {
            debug!("dropping {kind:?} from {origin}: not in a session");
            return;
        };
        let Some(identity) = self.connections.identity(origin) else {
            return;
        };
        data.insert(KEY_USER_ID.to_string(), json!(identity.user_id));
        if kind.carries_username() {
            data.insert(KEY_USERNAME.to_string(), json!(identity.username));
        }
        self.fan_out(&session, Some(origin), kind.message(data));
    }

    /// Clear the stored snapshot and tell the whole session, the origin
    /// included, so its own canvas clears too.
    fn clear_canvas(&self, origin: ConnectionId) {
        let Some(session) = self.connections.session_of(origin) else {
            debug!("dropping clear_canvas from {origin}: not in a session");
            return;
        };
        self.sessions.clear_snapshot(&session);
        self.fan_out(&session, None, ServerMessage::ClearCanvas);
    }

    /// Store a snapshot and acknowledge the caller only. A save without a
    /// `canvas_state` field clears the stored snapshot, matching the
    /// original server.
    fn save_canvas(&self, origin: ConnectionId, canvas_state: Option<Value>) {
        let Some(session) = self.connections.session_of(origin) else {
            debug!("dropping save_canvas from {origin}: not in a session");
            return;
        };
        match canvas_state {
            Some(state) => self.sessions.save_snapshot(&session, state),
            None => self.sessions.clear_snapshot(&session),
        }
        self.send_to(origin, ServerMessage::canvas_saved());
    }

    /// Deliver a message to every member of a session, except `exclude`.
    ///
    /// The member set is captured as a snapshot before delivery; a
    /// recipient whose queue is gone is skipped without affecting the
    /// rest.
    fn fan_out(&self, session: &str, exclude: Option<ConnectionId>, msg: ServerMessage) {
        let members = self.sessions.members(session);
        for member in members {
            if Some(member) == exclude {
                continue;
            }
            self.send_to(member, msg.clone());
        }
    }

    /// Queue a message for one connection. Unknown or closed connections
    /// are ignored.
    fn send_to(&self, id: ConnectionId, msg: ServerMessage) {
        if let Some(tx) = self.connections.sender(id) {
            let _ = tx.send(msg);
        }
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Drain both registries. Called once on server shutdown.
    pub fn shutdown(&self) {
        self.sessions.clear();
        self.connections.clear();
        info!("hub drained");
    }
}
