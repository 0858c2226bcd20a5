//! WebSocket connection lifecycle: outbound handle, read/write loops.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use inkroom_core::protocol::ProtocolError;

use crate::session::Session;
use crate::state::GatewayState;

/// Server-assigned identity of one client connection.
pub type ConnId = Uuid;

/// The outbound side of a client connection.
///
/// Frames go through an unbounded channel that a writer task drains into the
/// socket, so sending never waits on the network. Once the writer stops the
/// channel closes and every later send fails.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: ConnId,
    room_id: Arc<str>,
    tx: mpsc::UnboundedSender<String>,
}

#[derive(Debug, Error)]
#[error("connection {0} is closed")]
pub struct ConnectionClosed(pub ConnId);

impl ConnectionHandle {
    /// Create a handle bound to `room_id` and the receiver its writer drains.
    pub fn new(room_id: &str) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Self {
            id: Uuid::new_v4(),
            room_id: Arc::from(room_id),
            tx,
        };
        (handle, rx)
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    pub fn send(&self, frame: String) -> Result<(), ConnectionClosed> {
        self.tx.send(frame).map_err(|_| ConnectionClosed(self.id))
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("room_id", &self.room_id)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Why a connection's read loop stopped.
#[derive(Debug)]
enum CloseReason {
    ClientClosed,
    StreamEnded,
    Transport(axum::Error),
    Protocol(ProtocolError),
    IdleTimeout,
}

/// Drive one WebSocket client through its session in `room_id`.
pub async fn handle_ws_connection(state: Arc<GatewayState>, room_id: String, ws: WebSocket) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (conn, mut outbound) = ConnectionHandle::new(&room_id);
    let conn_id = conn.id();

    let active = state.connection_opened();
    info!(conn_id = %conn_id, room_id = %room_id, active, "Whiteboard client connected");

    let (session, replay) = Session::join(state.clone(), conn).await;

    // The replay goes straight to the socket so it precedes anything that
    // broadcasts have already queued on the channel.
    if let Some(frame) = replay {
        if ws_tx.send(Message::Text(frame.into())).await.is_err() {
            session.close().await;
            state.connection_closed();
            return;
        }
    }

    let send_task = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let reason = read_loop(&session, &mut ws_rx, state.config.idle_timeout()).await;
    match &reason {
        CloseReason::Protocol(e) => {
            warn!(conn_id = %conn_id, room_id = %room_id, %e, "Closing connection on malformed frame");
            #[cfg(feature = "metrics")]
            crate::metrics::record_malformed_frame();
        }
        CloseReason::Transport(e) => {
            warn!(conn_id = %conn_id, room_id = %room_id, %e, "WebSocket error");
        }
        other => debug!(conn_id = %conn_id, reason = ?other, "Read loop finished"),
    }

    send_task.abort();
    session.close().await;
    let active = state.connection_closed();
    info!(conn_id = %conn_id, room_id = %room_id, active, "Whiteboard client disconnected");
}

async fn read_loop(
    session: &Session,
    ws_rx: &mut SplitStream<WebSocket>,
    idle_timeout: Option<Duration>,
) -> CloseReason {
    loop {
        let next = match idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, ws_rx.next()).await {
                Ok(next) => next,
                Err(_) => return CloseReason::IdleTimeout,
            },
            None => ws_rx.next().await,
        };

        match next {
            None => return CloseReason::StreamEnded,
            Some(Err(e)) => return CloseReason::Transport(e),
            Some(Ok(Message::Text(text))) => {
                if let Err(e) = session.handle_text(text.as_str()).await {
                    return CloseReason::Protocol(e);
                }
            }
            Some(Ok(Message::Binary(_))) => {
                return CloseReason::Protocol(ProtocolError::BinaryFrame);
            }
            Some(Ok(Message::Close(_))) => return CloseReason::ClientClosed,
            // Axum answers pings itself
            Some(Ok(_)) => {}
        }
    }
}
