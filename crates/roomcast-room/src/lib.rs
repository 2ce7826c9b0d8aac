//! Chat rooms for Roomcast.
//!
//! Each [`Room`] guards its membership map with its own mutex, so two rooms
//! never contend and a room's broadcast pass cannot interleave with a join
//! or leave on the same room. The [`RoomRegistry`] owns every room, creates
//! the lobby up front, and coordinates moves between rooms.
//!
//! # Key types
//!
//! - [`RoomRegistry`]: name → room directory, create/join/list, moves
//! - [`Room`]: membership, announcements, mute-aware broadcast, close
//! - [`markup`]: the chat text markup applied to every broadcast

mod commands;
mod error;
pub mod markup;
mod registry;
mod room;

pub use commands::{flip_coin, roll_dice};
pub use error::RoomError;
pub use registry::RoomRegistry;
pub use room::Room;
