//! # Roomcast
//!
//! A multi-room chat server over WebSockets.
//!
//! Clients connect, pick a display name, land in the `lobby`, and from there
//! create, search and move between rooms. Messages sent in a room reach every
//! other member of that room except those who muted the sender.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use roomcast::prelude::*;
//!
//! # async fn run() -> Result<(), RoomcastError> {
//! let server = RoomcastServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod handler;
mod server;

pub use config::{ConfigError, ServerConfig};
pub use error::RoomcastError;
pub use server::{RoomcastServer, RoomcastServerBuilder};

pub mod prelude {
    pub use crate::{ConfigError, RoomcastError, RoomcastServer, ServerConfig};
    pub use roomcast_protocol::{ClientId, Codec, Envelope, JsonCodec, LOBBY, RollRequest};
}
