//! Per-connection whiteboard session.
//!
//! A session moves `Connecting -> Joined -> Closed`. [`Session::join`] performs
//! the first transition and yields a joined session; [`Session::close`]
//! consumes it. There is no resume: a client that drops must join again and
//! only sees the buffer as it is at that point.

use std::sync::Arc;

use tracing::{debug, error};

use inkroom_core::protocol::{ClientMessage, ServerMessage};
pub use inkroom_core::protocol::ProtocolError;

use crate::connection::{ConnId, ConnectionHandle};
use crate::state::GatewayState;

/// A connection that has joined its room.
pub struct Session {
    state: Arc<GatewayState>,
    conn: ConnectionHandle,
}

impl Session {
    /// Register `conn` in its room and announce it.
    ///
    /// Returns the joined session plus the encoded `existing_data` frame when
    /// the room has buffered draws. The caller must write that frame to the
    /// client before anything queued on the connection's channel.
    pub async fn join(state: Arc<GatewayState>, conn: ConnectionHandle) -> (Self, Option<String>) {
        let room_id = conn.room_id().to_string();
        let outcome = state.rooms.join(&room_id, conn.clone()).await;
        debug!(
            conn_id = %conn.id(),
            room_id = %room_id,
            is_new_room = outcome.is_new_room,
            replay = outcome.replay.len(),
            "Joined room"
        );

        let replay = if outcome.replay.is_empty() {
            None
        } else {
            match ServerMessage::existing_data(outcome.replay).to_json() {
                Ok(frame) => Some(frame),
                Err(e) => {
                    error!(%e, room_id = %room_id, "Failed to serialize replay");
                    None
                }
            }
        };

        state
            .broadcaster
            .broadcast(&room_id, &ServerMessage::user_joined(), Some(conn.id()))
            .await;

        (Self { state, conn }, replay)
    }

    pub fn conn_id(&self) -> ConnId {
        self.conn.id()
    }

    pub fn room_id(&self) -> &str {
        self.conn.room_id()
    }

    /// Handle one inbound text frame. An error means the session must close.
    pub async fn handle_text(&self, text: &str) -> Result<(), ProtocolError> {
        let room_id = self.room_id();
        match ClientMessage::parse(text)? {
            ClientMessage::Draw(event) => {
                let frame = event.as_str().to_owned();
                let Some(members) = self.state.rooms.append_event(room_id, event).await else {
                    debug!(room_id, "Room gone before draw was stored");
                    return Ok(());
                };
                #[cfg(feature = "metrics")]
                crate::metrics::record_draw_event();
                self.state
                    .broadcaster
                    .send_to(room_id, &members, frame, Some(self.conn_id()))
                    .await;
            }
            ClientMessage::Clear => {
                self.state.rooms.clear_buffer(room_id).await;
                self.state
                    .broadcaster
                    .broadcast(room_id, &ServerMessage::canvas_cleared(), Some(self.conn_id()))
                    .await;
            }
            ClientMessage::Other(kind) => {
                debug!(conn_id = %self.conn_id(), kind = %kind, "Ignoring unrecognized message type");
            }
        }
        Ok(())
    }

    /// Leave the room and tell whoever remains.
    pub async fn close(self) {
        let room_id = self.room_id();
        let destroyed = self.state.rooms.leave(room_id, self.conn_id()).await;
        debug!(conn_id = %self.conn_id(), room_id, destroyed, "Left room");
        self.state
            .broadcaster
            .broadcast(room_id, &ServerMessage::user_left(), None)
            .await;
    }
}
