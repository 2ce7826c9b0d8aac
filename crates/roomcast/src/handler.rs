//! Per-connection handler: read loop, writer task and message routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   0. Finish the WebSocket upgrade, bounded by the handshake timeout
//!   1. Create an anonymous session and spawn its writer task
//!   2. Loop: receive frames → decode → dispatch to the registry or room
//!   3. On peer close, read error or session termination, leave the room
//!
//! Everything the server says to a client goes through the session's outbox,
//! so room code never awaits on a socket.

use std::sync::Arc;

use roomcast_protocol::{Codec, Envelope, LOBBY};
use roomcast_session::{Session, SessionError};
use roomcast_transport::{Connection, Pending, WebSocketConnection, WebSocketUpgrade};
use tokio::sync::mpsc::Receiver;
use tokio::time::timeout;

use crate::RoomcastError;
use crate::server::ServerState;

/// Drop guard that takes a session out of its room when the handler exits.
///
/// Runs on every exit path, panics included. Room operations are
/// synchronous, so cleanup happens inline.
struct SessionGuard<C: Codec> {
    session: Arc<Session>,
    state: Arc<ServerState<C>>,
}

impl<C: Codec> Drop for SessionGuard<C> {
    fn drop(&mut self) {
        let room = {
            let _gate = self.session.lock_moves();
            let room = self.state.registry.current_room(&self.session);
            // terminated sessions are refused by every room, so nothing can
            // move this one anywhere after this point
            self.session.disconnect();
            room
        };
        if let Some(room) = room {
            room.force_disconnect(&self.session);
        }
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Codec>(
    pending: WebSocketUpgrade,
    state: Arc<ServerState<C>>,
) -> Result<(), RoomcastError> {
    let conn_id = pending.id();
    let peer = pending.peer_addr();
    let conn = match timeout(state.config.handshake_timeout(), pending.upgrade()).await {
        Ok(upgraded) => Arc::new(upgraded?),
        Err(_) => {
            tracing::info!(%conn_id, %peer, "handshake timed out, dropping peer");
            return Ok(());
        }
    };
    tracing::debug!(%conn_id, %peer, "handling new connection");

    let (session, outbox) = Session::with_capacity(conn_id, state.config.outbox_capacity);
    let session = Arc::new(session);
    let writer = tokio::spawn(write_loop(
        Arc::clone(&conn),
        outbox,
        Arc::clone(&state),
    ));
    let guard = SessionGuard {
        session: Arc::clone(&session),
        state: Arc::clone(&state),
    };

    loop {
        let data = tokio::select! {
            received = conn.recv() => match received {
                Ok(Some(data)) => data,
                Ok(None) => {
                    tracing::info!(%session, "connection closed by peer");
                    break;
                }
                Err(e) => {
                    tracing::debug!(%session, error = %e, "recv error");
                    break;
                }
            },
            () = session.terminated() => {
                tracing::debug!(%session, "session terminated, stopping read loop");
                break;
            }
        };

        let envelope: Envelope = match state.codec.decode(&data) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(%session, error = %e, "dropping undecodable frame");
                continue;
            }
        };
        dispatch(&state, &session, envelope);
    }

    // Leaving the room releases the outbox; the writer flushes what is
    // queued and closes the socket.
    drop(guard);
    if let Err(e) = writer.await {
        tracing::warn!(%conn_id, error = %e, "writer task failed");
    }
    Ok(())
}

/// Drains the session's outbox into the connection, one frame per envelope.
///
/// A frame the peer does not take within the write timeout ends the loop,
/// so a peer that stops reading cannot park the writer forever.
async fn write_loop<C: Codec>(
    conn: Arc<WebSocketConnection>,
    mut outbox: Receiver<Envelope>,
    state: Arc<ServerState<C>>,
) {
    let limit = state.config.write_timeout();
    while let Some(envelope) = outbox.recv().await {
        let bytes = match state.codec.encode(&envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(conn_id = %conn.id(), kind = envelope.kind(), error = %e, "encode failed");
                continue;
            }
        };
        // Dropping the receiver makes every later send on this session
        // fail, which gets it pruned from its room.
        match timeout(limit, conn.send(&bytes)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(conn_id = %conn.id(), error = %e, "send failed, stopping writer");
                break;
            }
            Err(_) => {
                tracing::info!(conn_id = %conn.id(), "peer stopped reading, stopping writer");
                break;
            }
        }
    }
    drop(outbox);
    if timeout(limit, conn.close()).await.is_err() {
        tracing::debug!(conn_id = %conn.id(), "close frame not flushed in time");
    }
}

/// Routes one inbound envelope. Dispatch after termination is a no-op.
fn dispatch<C: Codec>(state: &ServerState<C>, session: &Arc<Session>, envelope: Envelope) {
    if session.is_terminated() {
        return;
    }
    let kind = envelope.kind();
    tracing::trace!(%session, kind, "dispatch");

    let envelope = match envelope {
        Envelope::Connect { name } => {
            register(state, session, &name);
            return;
        }
        other => other,
    };

    let Some(room) = state.registry.current_room(session) else {
        if matches!(envelope, Envelope::Disconnect { .. }) {
            session.disconnect();
        } else {
            tracing::debug!(%session, kind, "not in a room, dropping");
        }
        return;
    };
    let limits = &state.config;

    match envelope {
        Envelope::Disconnect { .. } => {
            tracing::info!(%session, "client requested disconnect");
            room.force_disconnect(session);
        }
        Envelope::RoomCreate { room: name } => {
            if name.trim().chars().count() > limits.max_room_name_len {
                notify(
                    session,
                    format!(
                        "Room names are limited to {} characters",
                        limits.max_room_name_len
                    ),
                );
            } else {
                room.handle_create_room(session, &name);
            }
        }
        Envelope::RoomJoin { room: name, .. } => room.handle_join_room(session, &name),
        Envelope::RoomList { query, .. } => room.handle_list_rooms(session, &query),
        Envelope::Message { text, .. } => {
            if check_length(limits.max_message_len, session, &text) {
                room.broadcast(session.client_id(), &text);
            }
        }
        Envelope::PrivateMessage { target, text } => {
            if check_length(limits.max_message_len, session, &text) {
                room.private_message(session, target, &text);
            }
        }
        Envelope::Roll { sides, rolls, .. } => {
            if rolls > limits.max_dice || sides > limits.max_dice {
                notify(
                    session,
                    format!(
                        "You can roll at most {max} dice with at most {max} sides",
                        max = limits.max_dice
                    ),
                );
            } else {
                room.roll(session, rolls, sides);
            }
        }
        Envelope::Flip { .. } => room.flip(session),
        Envelope::Mute { target } => room.handle_mute(session, &target),
        Envelope::Unmute { target } => room.handle_unmute(session, &target),
        Envelope::Connect { .. }
        | Envelope::AssignId { .. }
        | Envelope::SyncClient { .. }
        | Envelope::MuteStatus { .. } => {
            tracing::debug!(%session, kind, "ignoring server-only message");
        }
    }
}

/// Handles `CONNECT`: names the session, confirms the id and places it in
/// the lobby.
fn register<C: Codec>(state: &ServerState<C>, session: &Arc<Session>, name: &str) {
    let id = match session.set_name(name, || state.next_client_id()) {
        Ok(id) => id,
        Err(SessionError::InvalidIdentity) => {
            notify(session, "Please choose a non-empty name.");
            return;
        }
        Err(e) => {
            tracing::debug!(%session, error = %e, "ignoring CONNECT");
            return;
        }
    };

    let confirmed = Envelope::AssignId {
        id,
        name: session.name().unwrap_or_default().to_string(),
    };
    if let Err(e) = session.send(confirmed) {
        tracing::debug!(%session, error = %e, "id confirmation not delivered");
        return;
    }
    if let Err(e) = state.registry.join_room(LOBBY, session) {
        tracing::warn!(%session, error = %e, "could not enter the lobby");
    }
}

fn check_length(max: usize, session: &Session, text: &str) -> bool {
    if text.len() > max {
        notify(session, format!("Message too long (max {max} bytes)"));
        false
    } else {
        true
    }
}

fn notify(session: &Session, text: impl Into<String>) {
    if let Err(e) = session.send(Envelope::notice(text)) {
        tracing::debug!(%session, error = %e, "notice not delivered");
    }
}
