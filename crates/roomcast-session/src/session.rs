//! The session type: one per accepted connection.
//!
//! A session moves through a small state machine:
//!
//! ```text
//!   Anonymous ──(set_name)──→ Named ──(enter lobby)──→ InRoom(x)
//!                                                        │   ↑
//!                                                        └───┘ (move)
//!   any state ──(disconnect)──→ Terminated   (absorbing)
//! ```
//!
//! Rooms hold `Arc<Session>` and call [`Session::send`] and
//! [`Session::is_muting`] from whichever task is broadcasting, so every
//! method here takes `&self` and is safe to call concurrently.

use std::fmt;
use std::sync::OnceLock;

use dashmap::DashSet;
use parking_lot::{Mutex, MutexGuard};
use roomcast_protocol::{ClientId, Envelope};
use roomcast_transport::ConnectionId;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};

use crate::SessionError;

/// Sending half of a session's outbound queue. The connection's writer task
/// owns the receiving half and turns each envelope into one frame.
pub type Outbox = mpsc::Sender<Envelope>;

/// Outbox size used by [`Session::channel`].
pub const DEFAULT_OUTBOX_CAPACITY: usize = 256;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, no name yet. Only `CONNECT` is meaningful.
    Anonymous,
    /// Named and holding an id, not yet placed in a room.
    Named,
    /// Member of the named room.
    InRoom(String),
    /// Disconnected. Everything received from here on is discarded.
    Terminated,
}

#[derive(Debug)]
struct Identity {
    id: ClientId,
    name: String,
}

/// Server-side state of one connected chat client.
pub struct Session {
    conn_id: ConnectionId,
    /// Written once by `set_name`, read lock-free afterwards.
    identity: OnceLock<Identity>,
    state: Mutex<SessionState>,
    /// `None` once the transport has been released.
    outbox: Mutex<Option<Outbox>>,
    /// Senders this session does not want to hear from. Read by other
    /// sessions' broadcast passes while this session mutates it.
    muted: DashSet<ClientId>,
    /// Serializes room moves of this session.
    move_gate: Mutex<()>,
    terminated: watch::Sender<bool>,
}

impl Session {
    /// Creates an anonymous session that delivers through `outbox`.
    pub fn new(conn_id: ConnectionId, outbox: Outbox) -> Self {
        Self {
            conn_id,
            identity: OnceLock::new(),
            state: Mutex::new(SessionState::Anonymous),
            outbox: Mutex::new(Some(outbox)),
            muted: DashSet::new(),
            move_gate: Mutex::new(()),
            terminated: watch::channel(false).0,
        }
    }

    /// Creates a session together with the receiving end of its outbox.
    pub fn channel(conn_id: ConnectionId) -> (Self, mpsc::Receiver<Envelope>) {
        Self::with_capacity(conn_id, DEFAULT_OUTBOX_CAPACITY)
    }

    /// Like [`channel`](Self::channel), queueing at most `capacity`
    /// envelopes (at least one).
    pub fn with_capacity(
        conn_id: ConnectionId,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(conn_id, tx), rx)
    }

    /// The transport connection this session wraps.
    pub fn conn_id(&self) -> ConnectionId {
        self.conn_id
    }

    /// The assigned id, once named.
    pub fn client_id(&self) -> Option<ClientId> {
        self.identity.get().map(|identity| identity.id)
    }

    /// The display name, once named.
    pub fn name(&self) -> Option<&str> {
        self.identity.get().map(|identity| identity.name.as_str())
    }

    /// Assigns the display name and an id produced by `assign`.
    ///
    /// `assign` runs only when the name is accepted, so rejected attempts do
    /// not burn ids. Leading and trailing whitespace is dropped.
    ///
    /// # Errors
    /// - [`SessionError::InvalidIdentity`] for an empty name
    /// - [`SessionError::AlreadyNamed`] if a name was set before
    /// - [`SessionError::Terminated`] after disconnect
    pub fn set_name(
        &self,
        name: &str,
        assign: impl FnOnce() -> ClientId,
    ) -> Result<ClientId, SessionError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::InvalidIdentity);
        }

        let mut state = self.state.lock();
        match *state {
            SessionState::Anonymous => {}
            SessionState::Terminated => {
                return Err(SessionError::Terminated(self.to_string()));
            }
            SessionState::Named | SessionState::InRoom(_) => {
                let id = self.client_id().unwrap_or_default();
                return Err(SessionError::AlreadyNamed(id));
            }
        }

        let id = assign();
        // Guarded by the state lock: only the Anonymous → Named transition
        // writes the identity.
        let _ = self.identity.set(Identity {
            id,
            name: name.to_string(),
        });
        *state = SessionState::Named;
        tracing::info!(conn_id = %self.conn_id, client_id = %id, name, "session named");
        Ok(id)
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> SessionState {
        self.state.lock().clone()
    }

    /// Name of the room this session belongs to, if any.
    pub fn current_room(&self) -> Option<String> {
        match &*self.state.lock() {
            SessionState::InRoom(room) => Some(room.clone()),
            _ => None,
        }
    }

    /// Records `room` as the current room.
    ///
    /// Returns `false`, leaving the state alone, when the session is
    /// anonymous or terminated.
    pub fn enter_room(&self, room: &str) -> bool {
        let mut state = self.state.lock();
        match *state {
            SessionState::Named | SessionState::InRoom(_) => {
                *state = SessionState::InRoom(room.to_string());
                true
            }
            SessionState::Anonymous | SessionState::Terminated => false,
        }
    }

    /// Queues one envelope for the writer task without waiting.
    ///
    /// Never retried here; the caller decides whether a failure means the
    /// peer is gone.
    ///
    /// # Errors
    /// - [`SessionError::Terminated`] if the transport was released
    /// - [`SessionError::Backlogged`] if the outbox is full
    /// - [`SessionError::SendFailed`] if the writer task has stopped
    pub fn send(&self, envelope: Envelope) -> Result<(), SessionError> {
        let outbox = self.outbox.lock();
        let Some(tx) = outbox.as_ref() else {
            return Err(SessionError::Terminated(self.to_string()));
        };
        tx.try_send(envelope).map_err(|e| match e {
            TrySendError::Full(_) => SessionError::Backlogged(self.to_string()),
            TrySendError::Closed(_) => SessionError::SendFailed(self.to_string()),
        })
    }

    /// Adds `sender` to the mute set. Returns `true` if it was not muted.
    pub fn mute(&self, sender: ClientId) -> bool {
        self.muted.insert(sender)
    }

    /// Removes `sender` from the mute set. Returns `true` if it was muted.
    pub fn unmute(&self, sender: ClientId) -> bool {
        self.muted.remove(&sender).is_some()
    }

    /// Whether broadcasts from `sender` are filtered out for this session.
    pub fn is_muting(&self, sender: ClientId) -> bool {
        self.muted.contains(&sender)
    }

    /// Takes the move gate. Held for the whole remove-then-add of a room
    /// move; never acquired while holding a room lock.
    pub fn lock_moves(&self) -> MutexGuard<'_, ()> {
        self.move_gate.lock()
    }

    /// Releases the transport and clears the room reference.
    ///
    /// Dropping the outbox lets the writer flush what is already queued and
    /// then close the connection, which in turn unblocks the read loop.
    /// Returns `true` only for the call that performed the teardown.
    pub fn disconnect(&self) -> bool {
        {
            let mut state = self.state.lock();
            if *state == SessionState::Terminated {
                return false;
            }
            *state = SessionState::Terminated;
        }
        self.outbox.lock().take();
        self.terminated.send_replace(true);
        tracing::info!(session = %self, "session terminated");
        true
    }

    /// Whether [`disconnect`](Self::disconnect) has run.
    pub fn is_terminated(&self) -> bool {
        *self.terminated.borrow()
    }

    /// Resolves once the session is terminated.
    pub async fn terminated(&self) {
        let mut rx = self.terminated.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.identity.get() {
            Some(identity) => write!(f, "{}[{}]", identity.name, identity.id),
            None => write!(f, "{}", self.conn_id),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("conn_id", &self.conn_id)
            .field("identity", &self.identity.get())
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

// =========================================================================
// Tests
// =========================================================================
