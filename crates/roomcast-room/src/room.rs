//! A single chat room.
//!
//! All membership changes and every delivery pass happen under the room's
//! mutex. Sends only enqueue onto a session's outbox, so the lock is never
//! held across an await and a slow client cannot stall the room.
//!
//! A member whose send fails is pruned within the same pass: it is removed,
//! its transport released, and the remaining members told it disconnected.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use roomcast_protocol::{ClientId, Envelope, LOBBY};
use roomcast_session::Session;
use tracing::{debug, info, trace, warn};

use crate::{RoomError, RoomRegistry, markup};

/// Announced to every member just before a room closes.
const SHUTDOWN_NOTICE: &str = "Room is shutting down, migrating to lobby";

struct Members {
    clients: HashMap<ClientId, Arc<Session>>,
    running: bool,
}

/// A named broadcast group of sessions.
pub struct Room {
    name: String,
    is_lobby: bool,
    members: Mutex<Members>,
    registry: Weak<RoomRegistry>,
}

impl Room {
    pub(crate) fn new(name: &str, registry: Weak<RoomRegistry>) -> Self {
        Self {
            name: name.to_string(),
            is_lobby: name.eq_ignore_ascii_case(LOBBY),
            members: Mutex::new(Members {
                clients: HashMap::new(),
                running: true,
            }),
            registry,
        }
    }

    pub(crate) fn registry(&self) -> Option<Arc<RoomRegistry>> {
        self.registry.upgrade()
    }

    /// Display name, as given at creation.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_lobby(&self) -> bool {
        self.is_lobby
    }

    /// Whether the room still accepts members.
    pub fn is_running(&self) -> bool {
        self.members.lock().running
    }

    /// Number of current members.
    pub fn len(&self) -> usize {
        self.members.lock().clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.members.lock().clients.contains_key(&id)
    }

    /// Ids of all current members, sorted.
    pub fn member_ids(&self) -> Vec<ClientId> {
        let mut ids: Vec<_> = self.members.lock().clients.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Looks up a member by id.
    pub fn member(&self, id: ClientId) -> Option<Arc<Session>> {
        self.members.lock().clients.get(&id).cloned()
    }

    /// Looks up a member by display name, ignoring case.
    pub fn member_by_name(&self, name: &str) -> Option<Arc<Session>> {
        let name = name.trim();
        self.members
            .lock()
            .clients
            .values()
            .find(|s| s.name().is_some_and(|n| n.eq_ignore_ascii_case(name)))
            .cloned()
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    /// Adds a named session to the room.
    ///
    /// Existing members get a `ROOM_JOIN` announcement. The joiner gets its
    /// own `ROOM_JOIN` followed by one `SYNC_CLIENT` per existing member.
    ///
    /// # Errors
    /// Leaves everything untouched and returns an error if the room is
    /// closed, the session is anonymous or terminated, or already a member.
    pub fn add_member(&self, session: &Arc<Session>) -> Result<(), RoomError> {
        let (Some(id), Some(name)) = (session.client_id(), session.name()) else {
            warn!(room = %self.name, session = %session, "anonymous session cannot join");
            return Err(RoomError::Anonymous);
        };

        let mut members = self.members.lock();
        if !members.running {
            warn!(room = %self.name, session = %session, "join refused, room closed");
            return Err(RoomError::Closed(self.name.clone()));
        }
        if members.clients.contains_key(&id) {
            warn!(room = %self.name, session = %session, "already a member");
            return Err(RoomError::AlreadyMember(id, self.name.clone()));
        }
        if !session.enter_room(&self.name) {
            warn!(room = %self.name, session = %session, "join refused, session terminated");
            return Err(RoomError::SessionTerminated(session.to_string()));
        }

        let joined = Envelope::RoomJoin {
            id,
            name: name.to_string(),
            room: self.name.clone(),
            joined: true,
        };
        self.deliver(&mut members, &joined, |_| true);

        let roster: Vec<Envelope> = std::iter::once(joined)
            .chain(members.clients.iter().map(|(&member_id, member)| {
                Envelope::SyncClient {
                    id: member_id,
                    name: member.name().unwrap_or_default().to_string(),
                }
            }))
            .collect();
        members.clients.insert(id, Arc::clone(session));

        for envelope in roster {
            if let Err(e) = session.send(envelope) {
                debug!(room = %self.name, error = %e, "joiner unreachable during sync");
                self.prune(&mut members, vec![id]);
                break;
            }
        }

        info!(room = %self.name, session = %session, members = members.clients.len(), "member joined");
        Ok(())
    }

    /// Removes a member, announcing the departure to everyone including the
    /// leaver, then closes the room if that left it empty.
    ///
    /// # Errors
    /// [`RoomError::Closed`] or [`RoomError::NotMember`], with no change.
    pub fn remove_member(&self, session: &Session) -> Result<(), RoomError> {
        self.detach(session)?;
        self.auto_cleanup();
        Ok(())
    }

    /// [`remove_member`](Self::remove_member) without the auto-close check.
    /// Used by moves, which must finish before an emptied source may close.
    pub(crate) fn detach(&self, session: &Session) -> Result<(), RoomError> {
        let mut members = self.members.lock();
        if !members.running {
            return Err(RoomError::Closed(self.name.clone()));
        }
        let id = match session.client_id() {
            Some(id) if members.clients.contains_key(&id) => id,
            id => {
                warn!(room = %self.name, session = %session, "leave ignored, not a member");
                return Err(RoomError::NotMember(id.unwrap_or_default(), self.name.clone()));
            }
        };

        let left = Envelope::RoomJoin {
            id,
            name: session.name().unwrap_or_default().to_string(),
            room: self.name.clone(),
            joined: false,
        };
        self.deliver(&mut members, &left, |_| true);
        members.clients.remove(&id);

        info!(room = %self.name, session = %session, members = members.clients.len(), "member left");
        Ok(())
    }

    /// Tells every member (the leaver too) that `session` disconnected,
    /// releases its transport and drops it from the room.
    ///
    /// The transport is released even when the session is not a member, so
    /// a disconnect request always ends the connection.
    pub fn force_disconnect(&self, session: &Session) {
        {
            let mut members = self.members.lock();
            match session.client_id() {
                Some(id) if members.running && members.clients.contains_key(&id) => {
                    let notice = Envelope::Disconnect {
                        id,
                        name: session.name().unwrap_or_default().to_string(),
                    };
                    self.deliver(&mut members, &notice, |member| member.client_id() != Some(id));
                    // the leaver's copy, its outbox may already be gone
                    let _ = session.send(notice);
                    session.disconnect();
                    members.clients.remove(&id);
                    info!(room = %self.name, session = %session, "member disconnected");
                }
                _ => {
                    session.disconnect();
                    return;
                }
            }
        }
        self.auto_cleanup();
    }

    // -----------------------------------------------------------------------
    // Delivery
    // -----------------------------------------------------------------------

    /// Sends `text` as a `MESSAGE` to every member not muting the sender.
    /// `None` sends a server notice that nobody can mute.
    pub fn broadcast(&self, sender: Option<ClientId>, text: &str) {
        let envelope = Envelope::Message {
            id: sender.unwrap_or(ClientId::SERVER),
            text: markup::render(text),
        };
        self.broadcast_envelope(sender, &envelope);
    }

    /// Delivers a prepared envelope with the same mute filtering as
    /// [`broadcast`](Self::broadcast).
    pub(crate) fn broadcast_envelope(&self, sender: Option<ClientId>, envelope: &Envelope) {
        let emptied = {
            let mut members = self.members.lock();
            if !members.running {
                debug!(room = %self.name, kind = envelope.kind(), "broadcast to closed room dropped");
                return;
            }
            let had_members = !members.clients.is_empty();
            self.deliver(&mut members, envelope, |member| match sender {
                Some(id) if member.is_muting(id) => {
                    trace!(room = %self.name, listener = %member, sender = %id, "muted, skipped");
                    false
                }
                _ => true,
            });
            had_members && members.clients.is_empty()
        };
        // pruning may have removed the last member
        if emptied {
            self.auto_cleanup();
        }
    }

    /// Sends to each member selected by `include`, then prunes whoever
    /// could not be reached.
    fn deliver(
        &self,
        members: &mut Members,
        envelope: &Envelope,
        include: impl Fn(&Session) -> bool,
    ) {
        let unreachable: Vec<ClientId> = members
            .clients
            .iter()
            .filter(|(_, member)| include(member))
            .filter_map(|(&id, member)| match member.send(envelope.clone()) {
                Ok(()) => None,
                Err(e) => {
                    debug!(room = %self.name, kind = envelope.kind(), error = %e, "delivery failed");
                    Some(id)
                }
            })
            .collect();
        self.prune(members, unreachable);
    }

    /// Removes unreachable members and announces each removal to the rest.
    /// Members that fail on those announcements are pruned in turn.
    fn prune(&self, members: &mut Members, mut unreachable: Vec<ClientId>) {
        while let Some(id) = unreachable.pop() {
            let Some(session) = members.clients.remove(&id) else {
                continue;
            };
            session.disconnect();
            warn!(room = %self.name, session = %session, "removed unreachable member");

            let notice = Envelope::Disconnect {
                id,
                name: session.name().unwrap_or_default().to_string(),
            };
            for (&other_id, other) in &members.clients {
                if other.send(notice.clone()).is_err() && !unreachable.contains(&other_id) {
                    unreachable.push(other_id);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Announces shutdown, stops the room, deregisters it and moves every
    /// member into the lobby.
    ///
    /// # Errors
    /// [`RoomError::LobbyPermanent`] for the lobby.
    pub fn close(&self) -> Result<(), RoomError> {
        if self.is_lobby {
            warn!("refusing to close the lobby");
            return Err(RoomError::LobbyPermanent);
        }
        self.shutdown(false);
        Ok(())
    }

    /// Closes the room if it is not the lobby and has no members left.
    pub(crate) fn auto_cleanup(&self) {
        if !self.is_lobby {
            self.shutdown(true);
        }
    }

    fn shutdown(&self, only_if_empty: bool) {
        let evicted: Vec<Arc<Session>> = {
            let mut members = self.members.lock();
            if !members.running || (only_if_empty && !members.clients.is_empty()) {
                return;
            }
            if !members.clients.is_empty() {
                self.deliver(&mut members, &Envelope::notice(SHUTDOWN_NOTICE), |_| true);
            }
            members.running = false;
            members.clients.drain().map(|(_, session)| session).collect()
        };

        info!(room = %self.name, migrating = evicted.len(), "room closed");
        let Some(registry) = self.registry() else {
            return;
        };
        registry.remove_room(self);
        for session in evicted {
            registry.migrate_to_lobby(&session, &self.name);
        }
    }
}

impl fmt::Debug for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let members = self.members.lock();
        f.debug_struct("Room")
            .field("name", &self.name)
            .field("running", &members.running)
            .field("members", &members.clients.len())
            .finish()
    }
}
