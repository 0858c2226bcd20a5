//! Room registry: per-room membership and draw-event replay buffers.
//!
//! A room exists only while it has members. The first join creates it and
//! the leave that empties it destroys both the membership set and the
//! buffer. Operations on rooms that do not exist are silent no-ops.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use inkroom_core::protocol::DrawEvent;

use crate::connection::{ConnId, ConnectionHandle};

/// Result of registering a connection in a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    pub is_new_room: bool,
    /// Buffered draw events at join time, oldest first.
    pub replay: Vec<DrawEvent>,
}

/// Administrative view of one room.
#[derive(Debug, Clone, Serialize)]
pub struct RoomSummary {
    pub room_id: String,
    pub user_count: usize,
    pub buffered_events: usize,
    pub created_at: DateTime<Utc>,
}

/// Storage for room membership and replay buffers.
///
/// Every mutation on a given room is atomic with respect to the others.
/// Implementations must never hold their internal locks across network I/O.
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Register `conn` in `room_id`, creating the room if needed.
    async fn join(&self, room_id: &str, conn: ConnectionHandle) -> JoinOutcome;

    /// Deregister a connection. Returns true when this call emptied (and so
    /// destroyed) the room.
    async fn leave(&self, room_id: &str, conn_id: ConnId) -> bool;

    /// Append a draw event and return the members it must be forwarded to.
    ///
    /// The snapshot is taken in the same critical section as the push, so a
    /// connection either sees the event in its join replay or is in the
    /// returned snapshot, never both. Returns `None` if the room does not
    /// exist.
    async fn append_event(
        &self,
        room_id: &str,
        event: DrawEvent,
    ) -> Option<Vec<ConnectionHandle>>;

    /// Empty the replay buffer, keeping members. Returns false if the room
    /// does not exist.
    async fn clear_buffer(&self, room_id: &str) -> bool;

    async fn member_count(&self, room_id: &str) -> usize;

    /// Snapshot of the room's current members.
    async fn members(&self, room_id: &str) -> Vec<ConnectionHandle>;

    /// Snapshot of the room's replay buffer, oldest first.
    async fn buffered_events(&self, room_id: &str) -> Vec<DrawEvent>;

    async fn room_count(&self) -> usize;

    async fn rooms(&self) -> Vec<RoomSummary>;
}

struct RoomState {
    members: HashMap<ConnId, ConnectionHandle>,
    buffer: VecDeque<DrawEvent>,
    created_at: DateTime<Utc>,
}

impl RoomState {
    fn new() -> Self {
        Self {
            members: HashMap::new(),
            buffer: VecDeque::new(),
            created_at: Utc::now(),
        }
    }
}

/// Process-local room store guarded by a single registry lock.
pub struct InMemoryRoomStore {
    rooms: RwLock<HashMap<String, RoomState>>,
    /// Replay cap per room; `None` is unbounded.
    max_replay_events: Option<usize>,
}

impl Default for InMemoryRoomStore {
    fn default() -> Self {
        Self::new(None)
    }
}

impl InMemoryRoomStore {
    pub fn new(max_replay_events: Option<usize>) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            max_replay_events,
        }
    }
}

#[async_trait]
impl RoomStore for InMemoryRoomStore {
    async fn join(&self, room_id: &str, conn: ConnectionHandle) -> JoinOutcome {
        let mut rooms = self.rooms.write().await;
        let is_new_room = !rooms.contains_key(room_id);
        let room = rooms
            .entry(room_id.to_string())
            .or_insert_with(RoomState::new);
        room.members.insert(conn.id(), conn);

        if is_new_room {
            debug!(room_id, "Room created");
            #[cfg(feature = "metrics")]
            crate::metrics::record_room_created();
        }

        JoinOutcome {
            is_new_room,
            replay: room.buffer.iter().cloned().collect(),
        }
    }

    async fn leave(&self, room_id: &str, conn_id: ConnId) -> bool {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get_mut(room_id) else {
            return false;
        };
        if room.members.remove(&conn_id).is_none() || !room.members.is_empty() {
            return false;
        }

        rooms.remove(room_id);
        debug!(room_id, "Room emptied and destroyed");
        #[cfg(feature = "metrics")]
        crate::metrics::record_room_destroyed();
        true
    }

    async fn append_event(
        &self,
        room_id: &str,
        event: DrawEvent,
    ) -> Option<Vec<ConnectionHandle>> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.get_mut(room_id)?;
        room.buffer.push_back(event);
        if let Some(cap) = self.max_replay_events {
            while room.buffer.len() > cap {
                room.buffer.pop_front();
            }
        }
        Some(room.members.values().cloned().collect())
    }

    async fn clear_buffer(&self, room_id: &str) -> bool {
        let mut rooms = self.rooms.write().await;
        match rooms.get_mut(room_id) {
            Some(room) => {
                room.buffer.clear();
                true
            }
            None => false,
        }
    }

    async fn member_count(&self, room_id: &str) -> usize {
        self.rooms
            .read()
            .await
            .get(room_id)
            .map(|r| r.members.len())
            .unwrap_or(0)
    }

    async fn members(&self, room_id: &str) -> Vec<ConnectionHandle> {
        self.rooms
            .read()
            .await
            .get(room_id)
            .map(|r| r.members.values().cloned().collect())
            .unwrap_or_default()
    }

    async fn buffered_events(&self, room_id: &str) -> Vec<DrawEvent> {
        self.rooms
            .read()
            .await
            .get(room_id)
            .map(|r| r.buffer.iter().cloned().collect())
            .unwrap_or_default()
    }

    async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    async fn rooms(&self) -> Vec<RoomSummary> {
        let rooms = self.rooms.read().await;
        let mut summaries: Vec<RoomSummary> = rooms
            .iter()
            .map(|(room_id, room)| RoomSummary {
                room_id: room_id.clone(),
                user_count: room.members.len(),
                buffered_events: room.buffer.len(),
                created_at: room.created_at,
            })
            .collect();
        summaries.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        summaries
    }
}
