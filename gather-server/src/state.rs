use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::ids::{ChatId, UserId};
use crate::messages::WsEvent;

pub type ConnectionId = u64;

/// Room carrying a chat's messages.
pub fn chat_room(chat_id: &ChatId) -> String {
    format!("chat:{}", chat_id)
}

/// A user's personal room for direct notifications.
pub fn user_room(user_id: &UserId) -> String {
    format!("user:{}", user_id)
}

struct ConnectionEntry {
    user_id: UserId,
    tx: mpsc::UnboundedSender<String>,
    rooms: HashSet<String>,
}

/// Live connections and their room subscriptions.
///
/// Lock order is always `connections` before `rooms`. `broadcast` snapshots a
/// room's members and releases the room before sending, so a subscribe or
/// disconnect racing a broadcast can neither deadlock nor double-deliver.
pub struct RoomRegistry {
    next_id: AtomicU64,
    connections: DashMap<ConnectionId, ConnectionEntry>,
    rooms: DashMap<String, HashSet<ConnectionId>>,
    /// user_id -> connection ids (supports multiple connections per user)
    users: DashMap<UserId, HashSet<ConnectionId>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            connections: DashMap::new(),
            rooms: DashMap::new(),
            users: DashMap::new(),
        }
    }

    /// Register a connection and subscribe it to its user's room.
    pub fn register(&self, user_id: UserId, tx: mpsc::UnboundedSender<String>) -> ConnectionId {
        let conn_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let personal = user_room(&user_id);
        self.connections.insert(
            conn_id,
            ConnectionEntry {
                user_id: user_id.clone(),
                tx,
                rooms: HashSet::new(),
            },
        );
        self.users.entry(user_id).or_default().insert(conn_id);
        self.subscribe(conn_id, personal);
        conn_id
    }

    /// Subscribe one connection to `room`. Returns false if the connection is
    /// gone or already subscribed.
    pub fn subscribe(&self, conn_id: ConnectionId, room: String) -> bool {
        let Some(mut entry) = self.connections.get_mut(&conn_id) else {
            return false;
        };
        if !entry.rooms.insert(room.clone()) {
            return false;
        }
        self.rooms.entry(room).or_default().insert(conn_id);
        true
    }

    /// Subscribe every live connection of `user_id` to `room`.
    /// Returns how many connections were newly subscribed.
    pub fn subscribe_user(&self, user_id: &UserId, room: &str) -> usize {
        let conn_ids: Vec<ConnectionId> = match self.users.get(user_id) {
            Some(ids) => ids.iter().copied().collect(),
            None => return 0,
        };
        let subscribed = conn_ids
            .into_iter()
            .filter(|conn_id| self.subscribe(*conn_id, room.to_string()))
            .count();
        if subscribed > 0 {
            debug!(user_id = %user_id, room = %room, subscribed, "Subscribed live connections");
        }
        subscribed
    }

    /// Remove a connection from every room it joined.
    pub fn unregister(&self, conn_id: ConnectionId) {
        let Some((_, entry)) = self.connections.remove(&conn_id) else {
            return;
        };

        for room in &entry.rooms {
            if let Some(mut members) = self.rooms.get_mut(room) {
                members.remove(&conn_id);
            }
            self.rooms.remove_if(room, |_, members| members.is_empty());
        }

        if let Some(mut ids) = self.users.get_mut(&entry.user_id) {
            ids.remove(&conn_id);
        }
        self.users.remove_if(&entry.user_id, |_, ids| ids.is_empty());
    }

    /// Send a raw frame to every connection in `room`. Returns the number of
    /// connections it was queued for.
    pub fn broadcast(&self, room: &str, frame: &str) -> usize {
        let members: Vec<ConnectionId> = match self.rooms.get(room) {
            Some(members) => members.iter().copied().collect(),
            None => return 0,
        };

        members
            .into_iter()
            .filter(|conn_id| self.send_raw(*conn_id, frame))
            .count()
    }

    pub fn publish(&self, room: &str, event: &WsEvent) -> usize {
        match serde_json::to_string(event) {
            Ok(frame) => self.broadcast(room, &frame),
            Err(e) => {
                error!(room = %room, error = %e, "Failed to serialize event");
                0
            }
        }
    }

    /// Send to one connection only.
    pub fn send_to(&self, conn_id: ConnectionId, event: &WsEvent) -> bool {
        match serde_json::to_string(event) {
            Ok(frame) => self.send_raw(conn_id, &frame),
            Err(e) => {
                error!(conn_id, error = %e, "Failed to serialize event");
                false
            }
        }
    }

    fn send_raw(&self, conn_id: ConnectionId, frame: &str) -> bool {
        self.connections
            .get(&conn_id)
            .map(|entry| entry.tx.send(frame.to_string()).is_ok())
            .unwrap_or(false)
    }

    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.users
            .get(user_id)
            .map(|ids| !ids.is_empty())
            .unwrap_or(false)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn room_size(&self, room: &str) -> usize {
        self.rooms.get(room).map(|members| members.len()).unwrap_or(0)
    }

    /// Rooms a connection is subscribed to, sorted.
    pub fn rooms_of(&self, conn_id: ConnectionId) -> Vec<String> {
        let mut rooms: Vec<String> = self
            .connections
            .get(&conn_id)
            .map(|entry| entry.rooms.iter().cloned().collect())
            .unwrap_or_default();
        rooms.sort();
        rooms
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
