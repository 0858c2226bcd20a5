//! Gateway shared state.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use inkroom_core::config::Config;
use inkroom_core::protocol::ServerMessage;

use crate::broadcast::Broadcaster;
use crate::rooms::{InMemoryRoomStore, RoomStore};

/// Shared gateway state accessible from all connections and handlers.
pub struct GatewayState {
    pub config: Arc<Config>,
    pub rooms: Arc<dyn RoomStore>,
    pub broadcaster: Broadcaster,
    connections: AtomicUsize,
}

impl GatewayState {
    /// State backed by an in-memory room store sized from `config`.
    pub fn new(config: Arc<Config>) -> Self {
        let rooms = Arc::new(InMemoryRoomStore::new(config.max_replay_events()));
        Self::with_store(config, rooms)
    }

    pub fn with_store(config: Arc<Config>, rooms: Arc<dyn RoomStore>) -> Self {
        Self {
            config,
            broadcaster: Broadcaster::new(rooms.clone()),
            rooms,
            connections: AtomicUsize::new(0),
        }
    }

    /// Administrative clear: empty the room's buffer and tell every member.
    pub async fn clear_room(&self, room_id: &str) {
        self.rooms.clear_buffer(room_id).await;
        self.broadcaster
            .broadcast(room_id, &ServerMessage::canvas_cleared_by_admin(), None)
            .await;
    }

    pub fn active_connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub(crate) fn connection_opened(&self) -> usize {
        #[cfg(feature = "metrics")]
        crate::metrics::record_ws_connect();
        self.connections.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn connection_closed(&self) -> usize {
        #[cfg(feature = "metrics")]
        crate::metrics::record_ws_disconnect();
        self.connections.fetch_sub(1, Ordering::SeqCst) - 1
    }
}
