//! Requests a member sends to its current room.
//!
//! Each handler answers problems with a notice to the requester instead of
//! returning an error; the read loop has nothing useful to do with one.

use std::sync::Arc;

use rand::Rng;
use roomcast_protocol::{ClientId, Envelope};
use roomcast_session::Session;
use tracing::{debug, info};

use crate::{Room, RoomError};

/// Rolls `rolls` dice with `sides` sides each and returns the total.
///
/// # Errors
/// [`RoomError::InvalidDice`] if either count is zero.
pub fn roll_dice(rng: &mut impl Rng, rolls: u32, sides: u32) -> Result<u32, RoomError> {
    if rolls == 0 || sides == 0 {
        return Err(RoomError::InvalidDice { rolls, sides });
    }
    Ok((0..rolls).fold(0u32, |total, _| {
        total.saturating_add(rng.random_range(1..=sides))
    }))
}

/// `"heads"` or `"tails"`.
pub fn flip_coin(rng: &mut impl Rng) -> &'static str {
    if rng.random_bool(0.5) { "heads" } else { "tails" }
}

fn notify(session: &Session, text: impl Into<String>) {
    if let Err(e) = session.send(Envelope::notice(text)) {
        debug!(session = %session, error = %e, "notice not delivered");
    }
}

impl Room {
    /// `ROOM_CREATE`: creates the room and moves the requester into it.
    pub fn handle_create_room(&self, session: &Arc<Session>, room: &str) {
        let Some(registry) = self.registry() else {
            return;
        };
        let result = registry
            .create_room(room)
            .and_then(|created| registry.join_room(created.name(), session));
        if let Err(e) = result {
            self.reply_room_error(session, room, e);
        }
    }

    /// `ROOM_JOIN`: moves the requester into an existing room.
    pub fn handle_join_room(&self, session: &Arc<Session>, room: &str) {
        let Some(registry) = self.registry() else {
            return;
        };
        if let Err(e) = registry.join_room(room, session) {
            self.reply_room_error(session, room, e);
        }
    }

    /// `ROOM_LIST`: answers with the sorted names matching `query`.
    pub fn handle_list_rooms(&self, session: &Session, query: &str) {
        let Some(registry) = self.registry() else {
            return;
        };
        let rooms = registry.list_rooms(Some(query));
        let message = if rooms.is_empty() {
            "No rooms found matching your query".to_string()
        } else {
            format!("{} room(s) found", rooms.len())
        };
        let reply = Envelope::RoomList {
            query: query.to_string(),
            rooms,
            message: Some(message),
        };
        if let Err(e) = session.send(reply) {
            debug!(session = %session, error = %e, "room list not delivered");
        }
    }

    /// Answers a refused request with a notice. `subject` is the room or
    /// user name as the requester spelled it.
    fn reply_room_error(&self, session: &Session, subject: &str, error: RoomError) {
        debug!(room = %self.name(), session = %session, error = %error, "request refused");
        let text = match error {
            RoomError::AlreadyExists(_) => format!("Room {subject} already exists"),
            RoomError::NotFound(_) | RoomError::Closed(_) => {
                format!("Room {subject} doesn't exist")
            }
            RoomError::AlreadyMember(..) => format!("You are already in room {subject}"),
            RoomError::InvalidName(_) => "Room names cannot be empty".to_string(),
            RoomError::UserNotFound(_) => "User not found.".to_string(),
            other => other.to_string(),
        };
        notify(session, text);
    }

    /// `MUTE`: stops delivering `target`'s broadcasts to the requester.
    pub fn handle_mute(&self, session: &Session, target: &str) {
        self.set_muted(session, target, true);
    }

    /// `UNMUTE`: resumes delivering `target`'s broadcasts to the requester.
    pub fn handle_unmute(&self, session: &Session, target: &str) {
        self.set_muted(session, target, false);
    }

    fn set_muted(&self, session: &Session, target: &str, muted: bool) {
        let Some(requester) = session.name() else {
            return;
        };
        let Some(target) = self.member_by_name(target) else {
            self.reply_room_error(session, target, RoomError::UserNotFound(target.to_string()));
            return;
        };
        let Some(target_id) = target.client_id() else {
            return;
        };

        let changed = if muted {
            session.mute(target_id)
        } else {
            session.unmute(target_id)
        };
        if !changed {
            return;
        }

        let verb = if muted { "muted" } else { "unmuted" };
        info!(room = %self.name(), session = %session, target = %target, verb, "mute changed");
        notify(&target, format!("{requester} {verb} you."));
        if let Err(e) = session.send(Envelope::MuteStatus {
            id: target_id,
            muted,
        }) {
            debug!(session = %session, error = %e, "mute status not delivered");
        }
        notify(
            session,
            format!("{} has been {verb}.", target.name().unwrap_or_default()),
        );
    }

    /// `PRIVATE_MESSAGE`: sends `text` to one member, echoing it back to the
    /// sender. A target muting the sender does not receive it.
    pub fn private_message(&self, session: &Session, target: ClientId, text: &str) {
        let (Some(sender_id), Some(sender)) = (session.client_id(), session.name()) else {
            return;
        };
        let Some(recipient) = self.member(target) else {
            let target = target.to_string();
            self.reply_room_error(session, &target, RoomError::UserNotFound(target.clone()));
            return;
        };

        let line = Envelope::Message {
            id: sender_id,
            text: format!("{sender} (private): {text}"),
        };
        if !recipient.is_muting(sender_id) {
            if let Err(e) = recipient.send(line.clone()) {
                debug!(session = %recipient, error = %e, "private message not delivered");
            }
        }
        if let Err(e) = session.send(line) {
            debug!(session = %session, error = %e, "private echo not delivered");
        }
    }

    /// `ROLL`: rolls server-side and broadcasts the outcome.
    pub fn roll(&self, session: &Session, rolls: u32, sides: u32) {
        let (Some(id), Some(name)) = (session.client_id(), session.name()) else {
            return;
        };
        let total = match roll_dice(&mut rand::rng(), rolls, sides) {
            Ok(total) => total,
            Err(e) => {
                notify(session, e.to_string());
                return;
            }
        };
        let result = Envelope::Roll {
            id,
            text: format!("<b>{name} (roll result): {name} rolled {rolls}d{sides} and got {total}</b>"),
            sides,
            rolls,
            total: Some(total),
        };
        self.broadcast_envelope(Some(id), &result);
    }

    /// `FLIP`: flips a coin server-side and broadcasts the outcome.
    pub fn flip(&self, session: &Session) {
        let (Some(id), Some(name)) = (session.client_id(), session.name()) else {
            return;
        };
        let side = flip_coin(&mut rand::rng());
        let result = Envelope::Flip {
            id,
            text: format!("<b>{name} (flip result): {name} flipped a coin and got {side}</b>"),
        };
        self.broadcast_envelope(Some(id), &result);
    }
}
