//! Presence/session registry: which live connections are subscribed to which group rooms.
//!
//! Every room is a single fan-out point. `publish` serializes the event once and pushes
//! it to all subscribers while holding the room's lock, so two events published to the
//! same room reach every subscriber in the same order. The lock is never held across an
//! `.await`: outbound queues are unbounded and `send` does not block.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chiacchiera_core::{models::User, ServerEvent};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A registered connection: its id and the queue of serialized frames to write to the socket.
pub struct Connection {
    pub id: ConnectionId,
    pub outbound: UnboundedReceiver<String>,
}

/// Registry of live connections and rooms.
///
/// Injected into the application state as `Arc<dyn Presence>`; a distributed
/// implementation (e.g. on top of a pub/sub layer) only has to honour the same
/// per-room ordering.
pub trait Presence: Send + Sync {
    fn connect(&self, user: &User) -> Connection;

    /// Subscribes the connection to the room. `false` if the connection is unknown.
    fn join(&self, conn: ConnectionId, group_id: &str) -> bool;

    /// `true` if the connection was subscribed.
    fn leave(&self, conn: ConnectionId, group_id: &str) -> bool;

    fn is_subscribed(&self, conn: ConnectionId, group_id: &str) -> bool;

    /// Drops every subscription of the connection and closes its outbound queue.
    fn disconnect(&self, conn: ConnectionId);

    /// Fans the event out to the room, skipping `except`. Returns how many connections got it.
    fn publish(&self, group_id: &str, event: &ServerEvent, except: Option<ConnectionId>) -> usize;

    /// Sends an event to one connection only (acks, errors).
    fn send_to(&self, conn: ConnectionId, event: &ServerEvent) -> bool;

    fn subscriber_count(&self, group_id: &str) -> usize;
}

struct Peer {
    user_id: String,
    sender: UnboundedSender<String>,
    rooms: HashSet<String>,
}

#[derive(Default)]
struct Room {
    subscribers: Mutex<HashMap<ConnectionId, UnboundedSender<String>>>,
}

/// In-process [`Presence`].
pub struct RoomRegistry {
    next_id: AtomicU64,
    connections: DashMap<ConnectionId, Peer>,
    rooms: DashMap<String, Arc<Room>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            connections: DashMap::new(),
            rooms: DashMap::new(),
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn remove_from_room(&self, conn: ConnectionId, group_id: &str) -> bool {
        let removed = match self.rooms.get(group_id) {
            Some(room) => room.subscribers.lock().remove(&conn).is_some(),
            None => false,
        };
        // remove_if holds the shard lock, so a concurrent join cannot land in a dropped room
        self.rooms
            .remove_if(group_id, |_, room| room.subscribers.lock().is_empty());
        removed
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn encode(event: &ServerEvent) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::error!(event = event.name(), error = %e, "failed to serialize event");
            None
        }
    }
}

impl Presence for RoomRegistry {
    fn connect(&self, user: &User) -> Connection {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, outbound) = unbounded_channel();
        self.connections.insert(
            id,
            Peer {
                user_id: user.user_id.clone(),
                sender,
                rooms: HashSet::new(),
            },
        );
        tracing::debug!(conn = %id, user = %user.user_id, "connection registered");
        Connection { id, outbound }
    }

    fn join(&self, conn: ConnectionId, group_id: &str) -> bool {
        let sender = match self.connections.get_mut(&conn) {
            Some(mut peer) => {
                peer.rooms.insert(group_id.to_string());
                peer.sender.clone()
            }
            None => return false,
        };
        let room = self.rooms.entry(group_id.to_string()).or_default();
        room.subscribers.lock().insert(conn, sender);
        true
    }

    fn leave(&self, conn: ConnectionId, group_id: &str) -> bool {
        if let Some(mut peer) = self.connections.get_mut(&conn) {
            peer.rooms.remove(group_id);
        }
        self.remove_from_room(conn, group_id)
    }

    fn is_subscribed(&self, conn: ConnectionId, group_id: &str) -> bool {
        self.connections
            .get(&conn)
            .map(|peer| peer.rooms.contains(group_id))
            .unwrap_or(false)
    }

    fn disconnect(&self, conn: ConnectionId) {
        if let Some((_, peer)) = self.connections.remove(&conn) {
            for group_id in &peer.rooms {
                self.remove_from_room(conn, group_id);
            }
            tracing::debug!(conn = %conn, user = %peer.user_id, rooms = peer.rooms.len(), "connection released");
        }
    }

    fn publish(&self, group_id: &str, event: &ServerEvent, except: Option<ConnectionId>) -> usize {
        let Some(text) = encode(event) else {
            return 0;
        };
        let Some(room) = self.rooms.get(group_id).map(|r| Arc::clone(r.value())) else {
            return 0;
        };

        let mut delivered = 0;
        let mut closed = Vec::new();
        {
            let mut subscribers = room.subscribers.lock();
            for (id, sender) in subscribers.iter() {
                if Some(*id) == except {
                    continue;
                }
                if sender.send(text.clone()).is_ok() {
                    delivered += 1;
                } else {
                    closed.push(*id);
                }
            }
            // receiver gone: the socket task has ended
            for id in &closed {
                subscribers.remove(id);
            }
        }
        tracing::debug!(group_id, event = event.name(), delivered, pruned = closed.len(), "fan-out");
        delivered
    }

    fn send_to(&self, conn: ConnectionId, event: &ServerEvent) -> bool {
        let Some(text) = encode(event) else {
            return false;
        };
        match self.connections.get(&conn) {
            Some(peer) => peer.sender.send(text).is_ok(),
            None => false,
        }
    }

    fn subscriber_count(&self, group_id: &str) -> usize {
        self.rooms
            .get(group_id)
            .map(|room| room.subscribers.lock().len())
            .unwrap_or(0)
    }
}
