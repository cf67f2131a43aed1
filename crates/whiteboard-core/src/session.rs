//! Session registry: named rooms, their members and their canvas snapshot.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;

use crate::connection::ConnectionId;

/// One named session.
#[derive(Debug)]
pub struct Session {
    /// Connections currently joined.
    members: HashSet<ConnectionId>,
    /// Last explicitly saved canvas, delivered verbatim to new joiners.
    canvas_state: Option<Value>,
    /// Set once, at first creation.
    created_at: DateTime<Utc>,
}

impl Session {
    fn new() -> Self {
        Self {
            members: HashSet::new(),
            canvas_state: None,
            created_at: Utc::now(),
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Outcome of adding a connection to a session.
#[derive(Debug)]
pub struct JoinOutcome {
    /// Saved snapshot to deliver to the joiner, if any.
    pub canvas_state: Option<Value>,
    /// Member count including the joiner.
    pub user_count: usize,
}

/// Registry of sessions keyed by client-supplied name.
///
/// First reference to a name creates the session; lookup and creation are a
/// single `entry` call, so two concurrent joiners cannot both create it.
/// A session is deleted as soon as its last member leaves, snapshot
/// included (the original server kept empty sessions forever; see
/// DESIGN.md).
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Add a connection to a session, creating the session if unseen.
    pub fn join(&self, name: &str, id: ConnectionId) -> JoinOutcome {
        let mut session = self
            .sessions
            .entry(name.to_string())
            .or_insert_with(Session::new);
        session.members.insert(id);
        JoinOutcome {
            canvas_state: session.canvas_state.clone(),
            user_count: session.members.len(),
        }
    }

    /// Remove a connection from a session. Idempotent; returns the number
    /// of members left. An empty session is deleted on the spot.
    pub fn leave(&self, name: &str, id: ConnectionId) -> usize {
        let remaining = match self.sessions.get_mut(name) {
            Some(mut session) => {
                session.members.remove(&id);
                session.members.len()
            }
            None => return 0,
        };
        if remaining == 0 {
            self.sessions.remove_if(name, |_, s| s.members.is_empty());
        }
        remaining
    }

    /// Replace the session's snapshot wholesale. Last write wins; unknown
    /// session names are a no-op. Membership is not checked here.
    pub fn save_snapshot(&self, name: &str, snapshot: Value) {
        if let Some(mut session) = self.sessions.get_mut(name) {
            session.canvas_state = Some(snapshot);
        }
    }

    /// Drop the session's snapshot. No-op for unknown names.
    pub fn clear_snapshot(&self, name: &str) {
        if let Some(mut session) = self.sessions.get_mut(name) {
            session.canvas_state = None;
        }
    }

    /// Current members of a session, captured as a snapshot for fan-out.
    pub fn members(&self, name: &str) -> Vec<ConnectionId> {
        self.sessions
            .get(name)
            .map(|s| s.members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Whether a connection is currently recorded as a member.
    pub fn is_member(&self, name: &str, id: ConnectionId) -> bool {
        self.sessions
            .get(name)
            .is_some_and(|s| s.members.contains(&id))
    }

    /// Current snapshot, if any.
    pub fn snapshot(&self, name: &str) -> Option<Value> {
        self.sessions.get(name).and_then(|s| s.canvas_state.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sessions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop every session record.
    pub fn clear(&self) {
        self.sessions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_join_creates_session() {
        let registry = SessionRegistry::new();
        let id = ConnectionId::new();
        let outcome = registry.join("room1", id);
        assert!(outcome.canvas_state.is_none());
        assert_eq!(outcome.user_count, 1);
        assert!(registry.contains("room1"));
        assert!(registry.is_member("room1", id));
    }

    #[test]
    fn test_join_is_idempotent_per_connection() {
        let registry = SessionRegistry::new();
        let id = ConnectionId::new();
        registry.join("room1", id);
        let outcome = registry.join("room1", id);
        assert_eq!(outcome.user_count, 1);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let registry = SessionRegistry::new();
        registry.join("room1", ConnectionId::new());
        let state = json!({"objects": [{"kind": "rect", "w": 10}], "background": "#fff"});
        registry.save_snapshot("room1", state.clone());

        let outcome = registry.join("room1", ConnectionId::new());
        assert_eq!(outcome.canvas_state, Some(state));
        assert_eq!(outcome.user_count, 2);
    }

    #[test]
    fn test_save_overwrites_wholesale() {
        let registry = SessionRegistry::new();
        registry.join("room1", ConnectionId::new());
        registry.save_snapshot("room1", json!({"v": 1}));
        registry.save_snapshot("room1", json!({"v": 2}));
        assert_eq!(registry.snapshot("room1"), Some(json!({"v": 2})));
    }

    #[test]
    fn test_clear_snapshot() {
        let registry = SessionRegistry::new();
        registry.join("room1", ConnectionId::new());
        registry.save_snapshot("room1", json!({"v": 1}));
        registry.clear_snapshot("room1");
        assert_eq!(registry.snapshot("room1"), None);
    }

    #[test]
    fn test_save_and_clear_on_unknown_session_are_noops() {
        let registry = SessionRegistry::new();
        registry.save_snapshot("ghost", json!({}));
        registry.clear_snapshot("ghost");
        assert!(!registry.contains("ghost"));
    }

    #[test]
    fn test_save_does_not_require_membership() {
        let registry = SessionRegistry::new();
        registry.join("room1", ConnectionId::new());
        // A caller that is not a member can still write the snapshot.
        registry.save_snapshot("room1", json!({"v": 1}));
        assert_eq!(registry.snapshot("room1"), Some(json!({"v": 1})));
    }

    #[test]
    fn test_empty_session_is_deleted() {
        let registry = SessionRegistry::new();
        let id = ConnectionId::new();
        registry.join("room1", id);
        registry.save_snapshot("room1", json!({"v": 1}));

        assert_eq!(registry.leave("room1", id), 0);
        assert!(!registry.contains("room1"));
        // The snapshot goes with it.
        assert!(registry.snapshot("room1").is_none());
    }

    #[test]
    fn test_leave_keeps_session_while_members_remain() {
        let registry = SessionRegistry::new();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        registry.join("room1", a);
        registry.join("room1", b);
        assert_eq!(registry.leave("room1", a), 1);
        assert!(registry.contains("room1"));
        assert!(registry.is_member("room1", b));
    }

    #[test]
    fn test_leave_is_idempotent() {
        let registry = SessionRegistry::new();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        registry.join("room1", a);
        registry.join("room1", b);
        registry.leave("room1", a);
        assert_eq!(registry.leave("room1", a), 1);
        assert_eq!(registry.leave("ghost", a), 0);
    }
}
