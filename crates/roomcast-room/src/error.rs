//! Error types for the room layer.
//!
//! None of these are fatal: the request that caused them is answered with a
//! notice (or just logged) and the session carries on.

use roomcast_protocol::ClientId;

/// Errors that can occur during room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// No room with this name is registered.
    #[error("room {0} doesn't exist")]
    NotFound(String),

    /// A room with this name (ignoring case) is already registered.
    #[error("room {0} already exists")]
    AlreadyExists(String),

    /// Room names must contain something besides whitespace.
    #[error("invalid room name {0:?}")]
    InvalidName(String),

    /// The room has been closed and accepts no further changes.
    #[error("room {0} is closed")]
    Closed(String),

    /// The session is already a member of this room.
    #[error("client {0} already in room {1}")]
    AlreadyMember(ClientId, String),

    /// The session is not a member of this room.
    #[error("client {0} not in room {1}")]
    NotMember(ClientId, String),

    /// Only named sessions can be room members.
    #[error("session has no name yet")]
    Anonymous,

    /// The session was disconnected before it could be added.
    #[error("session {0} is terminated")]
    SessionTerminated(String),

    /// The lobby is never closed.
    #[error("the lobby cannot be closed")]
    LobbyPermanent,

    /// A mute/unmute/private-message target is not in the requester's room.
    #[error("user {0} not found")]
    UserNotFound(String),

    /// Dice counts and sides must both be at least 1.
    #[error("cannot roll {rolls}d{sides}")]
    InvalidDice { rolls: u32, sides: u32 },
}
