//! Wire protocol for Roomcast.
//!
//! This crate defines what a chat client and the server say to each other:
//!
//! - **Types** ([`Envelope`], [`ClientId`]): the closed set of message
//!   kinds that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how envelopes are turned
//!   into frames and back.
//! - **Commands** ([`RollRequest`]): parsing of the dice notation clients
//!   type before it becomes a `ROLL` envelope.
//! - **Errors** ([`ProtocolError`]).
//!
//! The protocol layer knows nothing about connections or rooms.
//!
//! ```text
//! Transport (frames) → Protocol (Envelope) → Session / Room
//! ```

mod codec;
mod command;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use command::RollRequest;
pub use error::ProtocolError;
pub use types::{ClientId, Envelope, LOBBY};
