//! Frame types for the Duet protocol.
//!
//! Every frame is a single JSON object sent as a WebSocket text message.
//! Clients send arbitrary JSON; the server only ever emits the shapes below.

use serde::{Deserialize, Serialize};

/// Why a connection was refused before joining a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// No room token was supplied.
    InvalidRoom,
    /// The room already holds two members.
    RoomFull,
    /// The server refuses to open any more rooms.
    ServerFull,
}

impl RejectReason {
    /// The text carried in the `error` field.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::InvalidRoom => "Invalid room",
            RejectReason::RoomFull => "Room is full",
            RejectReason::ServerFull => "Server is full",
        }
    }

    /// Short label used for logs and metrics.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            RejectReason::InvalidRoom => "invalid_room",
            RejectReason::RoomFull => "room_full",
            RejectReason::ServerFull => "server_full",
        }
    }
}

/// A frame sent from the server to a client.
///
/// The wire form is untagged: `{"error": "..."}` or `{"message": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerFrame {
    /// Admission was refused; the connection closes right after.
    Error {
        /// Human-readable reason.
        error: String,
    },

    /// A payload relayed from the other room member.
    Relay {
        /// The sender's payload, re-serialized verbatim.
        message: serde_json::Value,
    },
}

impl ServerFrame {
    /// Create a rejection frame.
    #[must_use]
    pub fn rejection(reason: RejectReason) -> Self {
        ServerFrame::Error {
            error: reason.as_str().to_string(),
        }
    }

    /// Create a relay envelope around a parsed payload.
    #[must_use]
    pub fn relay(message: serde_json::Value) -> Self {
        ServerFrame::Relay { message }
    }

    /// Whether this frame reports an error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, ServerFrame::Error { .. })
    }
}

/// Response body of the room-minting endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomResponse {
    /// Freshly minted room token.
    pub room_id: String,
}

impl CreateRoomResponse {
    /// Create a response carrying a minted token.
    #[must_use]
    pub fn new(room_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
        }
    }
}
