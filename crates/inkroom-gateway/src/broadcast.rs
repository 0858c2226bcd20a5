//! Best-effort fan-out to the members of a room.

use std::sync::Arc;

use tracing::{debug, error, warn};

use inkroom_core::protocol::ServerMessage;

use crate::connection::{ConnId, ConnectionHandle};
use crate::rooms::RoomStore;

/// Delivers frames to every member of a room, optionally skipping one.
///
/// Each broadcast works on a membership snapshot taken at its start. Peers
/// whose channel is closed are skipped and then deregistered from the room;
/// nothing is reported back to the caller.
#[derive(Clone)]
pub struct Broadcaster {
    rooms: Arc<dyn RoomStore>,
}

impl Broadcaster {
    pub fn new(rooms: Arc<dyn RoomStore>) -> Self {
        Self { rooms }
    }

    /// Encode `message` once and fan it out.
    pub async fn broadcast(&self, room_id: &str, message: &ServerMessage, excluding: Option<ConnId>) {
        let frame = match message.to_json() {
            Ok(frame) => frame,
            Err(e) => {
                error!(%e, room_id, "Failed to serialize broadcast");
                return;
            }
        };
        self.broadcast_text(room_id, frame, excluding).await;
    }

    /// Fan out an already encoded frame.
    pub async fn broadcast_text(&self, room_id: &str, frame: String, excluding: Option<ConnId>) {
        let members = self.rooms.members(room_id).await;
        self.send_to(room_id, &members, frame, excluding).await;
    }

    /// Fan out to a membership snapshot the caller already holds, such as
    /// the one returned by [`RoomStore::append_event`].
    pub async fn send_to(
        &self,
        room_id: &str,
        members: &[ConnectionHandle],
        frame: String,
        excluding: Option<ConnId>,
    ) {
        if members.is_empty() {
            return;
        }

        let mut delivered = 0usize;
        let mut dead = Vec::new();
        for conn in members.iter().filter(|c| Some(c.id()) != excluding) {
            if !conn.is_open() {
                dead.push(conn.id());
                continue;
            }
            match conn.send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    debug!(%e, room_id, "Send failed");
                    dead.push(conn.id());
                }
            }
        }

        for conn_id in &dead {
            warn!(conn_id = %conn_id, room_id, "Dropping unreachable peer from room");
            self.rooms.leave(room_id, *conn_id).await;
        }

        debug!(room_id, delivered, dropped = dead.len(), "Broadcast to room");
        #[cfg(feature = "metrics")]
        crate::metrics::record_broadcast(delivered, dead.len());
    }
}
