//! Error types for the session layer.

use roomcast_protocol::ClientId;

/// Errors that can occur on a single session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The requested display name is empty.
    #[error("display name must not be empty")]
    InvalidIdentity,

    /// The session already picked a name and holds an id.
    #[error("session already named as {0}")]
    AlreadyNamed(ClientId),

    /// The session was disconnected; nothing more can be sent or changed.
    #[error("session {0} is terminated")]
    Terminated(String),

    /// The writer side of the connection is gone.
    #[error("send to {0} failed")]
    SendFailed(String),

    /// The outbox is full: the peer is not reading what it is sent.
    #[error("outbox of {0} is full")]
    Backlogged(String),
}
