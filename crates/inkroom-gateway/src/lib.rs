//! Room-scoped WebSocket broadcast gateway for the Inkroom whiteboard.
//!
//! Clients connect to `/ws/{room_id}`. Draw events are buffered per room and
//! fanned out to every other member; late joiners get the buffer replayed.
//! A room and its buffer disappear when its last member leaves.

pub mod admin;
pub mod broadcast;
pub mod connection;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod rooms;
pub mod server;
pub mod session;
pub mod state;

pub use broadcast::Broadcaster;
pub use connection::{ConnId, ConnectionHandle};
pub use rooms::{InMemoryRoomStore, JoinOutcome, RoomStore, RoomSummary};
pub use server::{router, serve, start_gateway};
pub use session::{ProtocolError, Session};
pub use state::GatewayState;
