//! Core protocol types for Roomcast's wire format.
//!
//! Every frame on a connection is exactly one [`Envelope`]. The set of
//! message kinds is closed: an unknown `type` tag fails to decode, and the
//! server's read loop drops the frame instead of guessing.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of the reserved default room every named session starts in.
///
/// Always exists, is never auto-closed, and cannot be created by clients.
pub const LOBBY: &str = "lobby";

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// A server-assigned identifier for a named session.
///
/// Ids are handed out starting at 1; `ClientId(0)` is the sentinel used as
/// the sender of server-generated messages and as the value of omitted id
/// fields on inbound frames.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct ClientId(pub u64);

impl ClientId {
    /// Sender id of messages the server itself authors.
    pub const SERVER: ClientId = ClientId(0);

    /// Returns `true` for the server sentinel.
    pub fn is_server(self) -> bool {
        self == Self::SERVER
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// One protocol message.
///
/// Internally tagged with `SCREAMING_SNAKE_CASE` names, so a chat line looks
/// like `{"type": "MESSAGE", "id": 4, "text": "hi"}`. Fields a client has no
/// reason to fill in (sender ids, result text) default when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Envelope {
    /// Client → Server: first message, carries the chosen display name.
    Connect { name: String },

    /// Server → Client: the identifier assigned to this session.
    #[serde(rename = "CLIENT_ID")]
    AssignId { id: ClientId, name: String },

    /// Server → Client: roster entry for a member already in the room.
    SyncClient { id: ClientId, name: String },

    /// Client → Server: "log me out".
    /// Server → Client: member `id` disconnected.
    Disconnect {
        #[serde(default)]
        id: ClientId,
        #[serde(default)]
        name: String,
    },

    /// Client → Server: create `room` and move into it.
    RoomCreate { room: String },

    /// Client → Server: move into `room`.
    /// Server → Client: member `id` joined (`joined = true`) or left `room`.
    RoomJoin {
        #[serde(default)]
        id: ClientId,
        #[serde(default)]
        name: String,
        room: String,
        #[serde(default)]
        joined: bool,
    },

    /// Client → Server: search rooms whose name contains `query`.
    /// Server → Client: matching `rooms`.
    RoomList {
        #[serde(default)]
        query: String,
        #[serde(default)]
        rooms: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Chat text. Inbound `id` is ignored; outbound `id` is the author, or
    /// [`ClientId::SERVER`] for notices.
    Message {
        #[serde(default)]
        id: ClientId,
        text: String,
    },

    /// Client → Server: roll `rolls` dice with `sides` sides each.
    /// Server → Client: the outcome, with `total` filled in.
    Roll {
        #[serde(default)]
        id: ClientId,
        #[serde(default)]
        text: String,
        sides: u32,
        rolls: u32,
        #[serde(default)]
        total: Option<u32>,
    },

    /// Client → Server: flip a coin. Server → Client: the outcome.
    Flip {
        #[serde(default)]
        id: ClientId,
        #[serde(default)]
        text: String,
    },

    /// Client → Server: stop receiving broadcasts from `target` (display name).
    Mute { target: String },

    /// Client → Server: resume receiving broadcasts from `target`.
    Unmute { target: String },

    /// Server → Client: this session's mute state towards `id` changed.
    MuteStatus { id: ClientId, muted: bool },

    /// Client → Server: direct message to the member with id `target`.
    PrivateMessage { target: ClientId, text: String },
}

impl Envelope {
    /// A server-authored chat line.
    pub fn notice(text: impl Into<String>) -> Self {
        Self::Message {
            id: ClientId::SERVER,
            text: text.into(),
        }
    }

    /// The wire tag of this envelope, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "CONNECT",
            Self::AssignId { .. } => "CLIENT_ID",
            Self::SyncClient { .. } => "SYNC_CLIENT",
            Self::Disconnect { .. } => "DISCONNECT",
            Self::RoomCreate { .. } => "ROOM_CREATE",
            Self::RoomJoin { .. } => "ROOM_JOIN",
            Self::RoomList { .. } => "ROOM_LIST",
            Self::Message { .. } => "MESSAGE",
            Self::Roll { .. } => "ROLL",
            Self::Flip { .. } => "FLIP",
            Self::Mute { .. } => "MUTE",
            Self::Unmute { .. } => "UNMUTE",
            Self::MuteStatus { .. } => "MUTE_STATUS",
            Self::PrivateMessage { .. } => "PRIVATE_MESSAGE",
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
