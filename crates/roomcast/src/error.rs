//! Unified error type for the Roomcast server.

use roomcast_protocol::ProtocolError;
use roomcast_room::RoomError;
use roomcast_session::SessionError;
use roomcast_transport::TransportError;

use crate::ConfigError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate errors
/// automatically.
#[derive(Debug, thiserror::Error)]
pub enum RoomcastError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (naming, terminated, send).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room-level error (not found, exists, closed).
    #[error(transparent)]
    Room(#[from] RoomError),

    /// The configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let roomcast_err: RoomcastError = err.into();
        assert!(matches!(roomcast_err, RoomcastError::Transport(_)));
        assert!(roomcast_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let roomcast_err: RoomcastError = err.into();
        assert!(matches!(roomcast_err, RoomcastError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let roomcast_err: RoomcastError = SessionError::InvalidIdentity.into();
        assert!(matches!(roomcast_err, RoomcastError::Session(_)));
    }

    #[test]
    fn test_from_room_error() {
        let err = RoomError::NotFound("trivia".into());
        let roomcast_err: RoomcastError = err.into();
        assert!(matches!(roomcast_err, RoomcastError::Room(_)));
        assert_eq!(roomcast_err.to_string(), "room trivia doesn't exist");
    }

    #[test]
    fn test_from_config_error() {
        let roomcast_err: RoomcastError = ConfigError::Invalid("nope".into()).into();
        assert!(matches!(roomcast_err, RoomcastError::Config(_)));
    }
}
