//! Whiteboard wire protocol.
//!
//! Every frame is a JSON object with a `type` discriminant. Clients send
//! `draw` and `clear`; the server sends `existing_data`, `user_joined`,
//! `user_left`, and `clear_canvas`.

use serde::Serialize;
use serde_json::value::RawValue;
use thiserror::Error;

pub const TYPE_DRAW: &str = "draw";
pub const TYPE_CLEAR: &str = "clear";

pub const MSG_EXISTING_DATA: &str = "Existing drawing data";
pub const MSG_USER_JOINED: &str = "A user joined the whiteboard";
pub const MSG_USER_LEFT: &str = "A user left the whiteboard";
pub const MSG_CANVAS_CLEARED: &str = "Canvas cleared";
pub const MSG_CANVAS_CLEARED_BY_ADMIN: &str = "Canvas cleared by user";

/// Why an inbound frame could not be understood.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("frame has no string `type` field")]
    MissingType,

    #[error("binary frames are not supported")]
    BinaryFrame,
}

/// A `draw` frame kept exactly as the client sent it.
///
/// The payload is opaque to the server; storing the raw JSON means replays
/// and broadcasts preserve the client's field order and number formatting.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct DrawEvent(Box<RawValue>);

impl DrawEvent {
    /// Wrap a JSON text. Surrounding whitespace is dropped.
    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        RawValue::from_string(text.trim().to_owned()).map(Self)
    }

    pub fn as_str(&self) -> &str {
        self.0.get()
    }
}

impl PartialEq for DrawEvent {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for DrawEvent {}

/// Client -> Server frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Draw(DrawEvent),
    Clear,
    /// Any type the server does not know. Ignored by the session loop.
    Other(String),
}

impl ClientMessage {
    /// Parse one text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let object = value.as_object().ok_or(ProtocolError::NotAnObject)?;
        let kind = object
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or(ProtocolError::MissingType)?;

        Ok(match kind {
            TYPE_DRAW => ClientMessage::Draw(DrawEvent::from_text(text)?),
            TYPE_CLEAR => ClientMessage::Clear,
            other => ClientMessage::Other(other.to_string()),
        })
    }
}

/// Server -> Client frame.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Replay of the room's buffered draw events, sent once on join.
    ExistingData {
        message: String,
        data: Vec<DrawEvent>,
    },
    UserJoined {
        message: String,
    },
    UserLeft {
        message: String,
    },
    ClearCanvas {
        message: String,
    },
}

impl ServerMessage {
    pub fn existing_data(data: Vec<DrawEvent>) -> Self {
        ServerMessage::ExistingData {
            message: MSG_EXISTING_DATA.into(),
            data,
        }
    }

    pub fn user_joined() -> Self {
        ServerMessage::UserJoined {
            message: MSG_USER_JOINED.into(),
        }
    }

    pub fn user_left() -> Self {
        ServerMessage::UserLeft {
            message: MSG_USER_LEFT.into(),
        }
    }

    /// Notice sent when a participant clears the canvas.
    pub fn canvas_cleared() -> Self {
        ServerMessage::ClearCanvas {
            message: MSG_CANVAS_CLEARED.into(),
        }
    }

    /// Notice sent when the canvas is cleared through the admin API.
    pub fn canvas_cleared_by_admin() -> Self {
        ServerMessage::ClearCanvas {
            message: MSG_CANVAS_CLEARED_BY_ADMIN.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
