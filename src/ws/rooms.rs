//! Room membership registry.
//!
//! Tracks which WebSocket connections are viewing which project, and
//! delivers events to a room's member set. Delivery is fire-and-forget
//! over each connection's unbounded channel; there are no acks and no
//! replay for late joiners. A client that reconnects re-fetches
//! authoritative state over HTTP.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::ws::protocol::ServerEvent;
use crate::ws::{ConnectionId, ConnectionSender};

/// One connection's seat in a room: identity for event tagging plus the
/// channel to reach its writer task.
#[derive(Clone)]
pub struct RoomMember {
    pub user_id: String,
    pub username: String,
    pub tx: ConnectionSender,
}

/// Registry of rooms and their members. Owned by AppState and injected
/// into the connection actors; tests construct isolated instances.
///
/// Rooms are created implicitly on first join and dropped when their
/// member set empties. The reverse index (`joined`) lets a disconnect
/// sweep every room a connection was part of without consulting the
/// actor.
pub struct RoomRegistry {
    rooms: DashMap<String, HashMap<ConnectionId, RoomMember>>,
    joined: DashMap<ConnectionId, HashSet<String>>,
    next_id: AtomicU64,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            joined: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate a process-unique connection id.
    pub fn next_connection_id(&self) -> ConnectionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Add a connection to a room. Idempotent: joining a room the
    /// connection is already in changes nothing.
    pub fn join(&self, conn_id: ConnectionId, member: RoomMember, room_id: &str) {
        self.rooms
            .entry(room_id.to_string())
            .or_default()
            .entry(conn_id)
            .or_insert(member);
        self.joined
            .entry(conn_id)
            .or_default()
            .insert(room_id.to_string());

        tracing::debug!(conn_id, room_id, "Joined room");
    }

    /// Remove a connection from a room. Idempotent: leaving a room the
    /// connection never joined changes nothing. An emptied room is
    /// dropped from the registry.
    pub fn leave(&self, conn_id: ConnectionId, room_id: &str) {
        if let Some(mut members) = self.rooms.get_mut(room_id) {
            members.remove(&conn_id);
        }
        // Guard must be released before remove_if on the same key
        self.rooms.remove_if(room_id, |_, members| members.is_empty());

        if let Some(mut joined) = self.joined.get_mut(&conn_id) {
            joined.remove(room_id);
        }
        self.joined.remove_if(&conn_id, |_, rooms| rooms.is_empty());

        tracing::debug!(conn_id, room_id, "Left room");
    }

    /// Remove a connection from every room it was part of. Called by the
    /// actor when the socket closes; peers receive no leave notification.
    pub fn remove_connection(&self, conn_id: ConnectionId) {
        let rooms: Vec<String> = self
            .joined
            .remove(&conn_id)
            .map(|(_, rooms)| rooms.into_iter().collect())
            .unwrap_or_default();

        for room_id in rooms {
            if let Some(mut members) = self.rooms.get_mut(&room_id) {
                members.remove(&conn_id);
            }
            self.rooms
                .remove_if(&room_id, |_, members| members.is_empty());
        }

        tracing::debug!(conn_id, "Connection removed from all rooms");
    }

    /// Whether a connection is currently a member of a room.
    pub fn is_member(&self, conn_id: ConnectionId, room_id: &str) -> bool {
        self.rooms
            .get(room_id)
            .map(|members| members.contains_key(&conn_id))
            .unwrap_or(false)
    }

    /// Number of connections currently in a room.
    pub fn room_size(&self, room_id: &str) -> usize {
        self.rooms
            .get(room_id)
            .map(|members| members.len())
            .unwrap_or(0)
    }

    /// Deliver an event to every member of a room, optionally excluding
    /// one connection. The room entry is held for the duration of the
    /// send loop, so delivery covers exactly the membership at the
    /// moment of the call. Send errors mean the receiver is shutting
    /// down and are ignored; the actor's cleanup removes it.
    pub fn broadcast(&self, room_id: &str, event: &ServerEvent, exclude: Option<ConnectionId>) {
        let text = match serde_json::to_string(event) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(room_id, error = %e, "Failed to serialize event");
                return;
            }
        };

        if let Some(members) = self.rooms.get(room_id) {
            for (conn_id, member) in members.iter() {
                if exclude == Some(*conn_id) {
                    continue;
                }
                let _ = member
                    .tx
                    .send(axum::extract::ws::Message::Text(text.clone().into()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::ws::Message;
    use tokio::sync::mpsc;

    fn member(user: &str) -> (RoomMember, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            RoomMember {
                user_id: user.to_string(),
                username: format!("{}-name", user),
                tx,
            },
            rx,
        )
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(Message::Text(text)) = rx.try_recv() {
            out.push(text.to_string());
        }
        out
    }

    #[test]
    fn join_is_idempotent() {
        let registry = RoomRegistry::new();
        let (m, _rx) = member("alice");
        let id = registry.next_connection_id();

        registry.join(id, m.clone(), "p1");
        registry.join(id, m, "p1");

        assert_eq!(registry.room_size("p1"), 1);
        assert!(registry.is_member(id, "p1"));
    }

    #[test]
    fn leave_is_idempotent_and_drops_empty_rooms() {
        let registry = RoomRegistry::new();
        let (m, _rx) = member("alice");
        let id = registry.next_connection_id();

        registry.join(id, m, "p1");
        registry.leave(id, "p1");
        registry.leave(id, "p1");
        // Leaving a room never joined is a no-op
        registry.leave(id, "p2");

        assert_eq!(registry.room_size("p1"), 0);
        assert!(!registry.is_member(id, "p1"));
        assert!(registry.rooms.get("p1").is_none());
    }

    #[test]
    fn remove_connection_sweeps_all_rooms() {
        let registry = RoomRegistry::new();
        let (m, _rx) = member("alice");
        let id = registry.next_connection_id();

        registry.join(id, m.clone(), "p1");
        registry.join(id, m, "p2");
        registry.remove_connection(id);

        assert!(!registry.is_member(id, "p1"));
        assert!(!registry.is_member(id, "p2"));
        assert!(registry.joined.get(&id).is_none());
    }

    #[test]
    fn broadcast_reaches_current_members_only() {
        let registry = RoomRegistry::new();
        let (alice, mut alice_rx) = member("alice");
        let (bob, mut bob_rx) = member("bob");
        let (carol, mut carol_rx) = member("carol");
        let alice_id = registry.next_connection_id();
        let bob_id = registry.next_connection_id();
        let carol_id = registry.next_connection_id();

        registry.join(alice_id, alice, "p1");
        registry.join(bob_id, bob, "p1");
        registry.join(carol_id, carol, "other");

        let event = ServerEvent::TaskDeleted("t1".to_string());
        registry.broadcast("p1", &event, None);

        assert_eq!(drain(&mut alice_rx).len(), 1);
        assert_eq!(drain(&mut bob_rx).len(), 1);
        assert!(drain(&mut carol_rx).is_empty());

        // Excluded connection receives nothing
        registry.broadcast("p1", &event, Some(alice_id));
        assert!(drain(&mut alice_rx).is_empty());
        assert_eq!(drain(&mut bob_rx).len(), 1);
    }

    #[test]
    fn emptied_room_restarts_clean() {
        let registry = RoomRegistry::new();
        let (alice, mut alice_rx) = member("alice");
        let alice_id = registry.next_connection_id();

        registry.join(alice_id, alice, "p1");
        registry.remove_connection(alice_id);
        assert_eq!(registry.room_size("p1"), 0);

        // A departed member gets nothing when the room is reused
        let (bob, mut bob_rx) = member("bob");
        let bob_id = registry.next_connection_id();
        registry.join(bob_id, bob, "p1");

        let event = ServerEvent::TaskDeleted("t2".to_string());
        registry.broadcast("p1", &event, None);

        assert!(drain(&mut alice_rx).is_empty());
        assert_eq!(drain(&mut bob_rx).len(), 1);
    }
}
