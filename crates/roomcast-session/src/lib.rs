//! Chat session state for Roomcast.
//!
//! A [`Session`] is the server's record of one live connection: who the
//! peer claims to be, which room it sits in, whom it has muted, and the
//! queue its writer task drains into the transport.
//!
//! # How it fits in the stack
//!
//! ```text
//! Room Layer (above)  ← holds Arc<Session> per member, delivers through it
//!     ↕
//! Session Layer (this crate)  ← identity, state machine, mute set, outbox
//!     ↕
//! Protocol Layer (below)  ← provides ClientId, Envelope
//! ```

mod error;
mod session;

pub use error::SessionError;
pub use session::{DEFAULT_OUTBOX_CAPACITY, Outbox, Session, SessionState};
