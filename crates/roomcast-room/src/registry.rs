//! The room directory.
//!
//! Names are matched case-insensitively: the map is keyed by the lowercased
//! name while each [`Room`] keeps the spelling it was created with.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use roomcast_protocol::LOBBY;
use roomcast_session::Session;
use tracing::{debug, info, warn};

use crate::{Room, RoomError};

fn key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Owns every open room, starting with the lobby.
pub struct RoomRegistry {
    rooms: DashMap<String, Arc<Room>>,
    lobby: Arc<Room>,
}

impl RoomRegistry {
    /// Creates a registry holding only the lobby.
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|registry| {
            let lobby = Arc::new(Room::new(LOBBY, registry.clone()));
            let rooms = DashMap::new();
            rooms.insert(key(LOBBY), Arc::clone(&lobby));
            info!(room = LOBBY, "lobby ready");
            Self { rooms, lobby }
        })
    }

    pub fn lobby(&self) -> Arc<Room> {
        Arc::clone(&self.lobby)
    }

    /// Looks a room up by name, ignoring case.
    pub fn get(&self, name: &str) -> Option<Arc<Room>> {
        self.rooms.get(&key(name)).map(|room| Arc::clone(room.value()))
    }

    /// Number of open rooms, the lobby included.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// The room `session` is currently a member of.
    pub fn current_room(&self, session: &Session) -> Option<Arc<Room>> {
        let id = session.client_id()?;
        self.get(&session.current_room()?)
            .filter(|room| room.contains(id))
    }

    /// Registers a new, empty room.
    ///
    /// # Errors
    /// - [`RoomError::InvalidName`] for a blank name
    /// - [`RoomError::AlreadyExists`] if the name is taken, ignoring case
    pub fn create_room(self: &Arc<Self>, name: &str) -> Result<Arc<Room>, RoomError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RoomError::InvalidName(name.to_string()));
        }
        match self.rooms.entry(key(name)) {
            Entry::Occupied(_) => {
                debug!(room = name, "create refused, name taken");
                Err(RoomError::AlreadyExists(name.to_string()))
            }
            Entry::Vacant(slot) => {
                let room = Arc::new(Room::new(name, Arc::downgrade(self)));
                slot.insert(Arc::clone(&room));
                info!(room = name, "room created");
                Ok(room)
            }
        }
    }

    /// Moves `session` out of its current room and into `name`.
    ///
    /// The whole move holds the session's move gate, so a session is never
    /// seen in two rooms. If the target closes before the session lands in
    /// it, the session falls back to the lobby. A source room emptied by the
    /// move is closed only after the gate is released.
    ///
    /// # Errors
    /// - [`RoomError::NotFound`] if no open room has that name
    /// - [`RoomError::AlreadyMember`] if the session is already there
    pub fn join_room(&self, name: &str, session: &Arc<Session>) -> Result<(), RoomError> {
        let target = self
            .get(name)
            .ok_or_else(|| RoomError::NotFound(name.trim().to_string()))?;

        let source = {
            let _gate = session.lock_moves();
            let source = self.current_room(session);
            if let Some(source) = &source {
                if Arc::ptr_eq(source, &target) {
                    return Err(RoomError::AlreadyMember(
                        session.client_id().unwrap_or_default(),
                        target.name().to_string(),
                    ));
                }
            }
            if !target.is_running() {
                return Err(RoomError::NotFound(target.name().to_string()));
            }

            if let Some(source) = &source {
                if let Err(e) = source.detach(session) {
                    debug!(room = %source.name(), error = %e, "source already released the session");
                }
            }
            if let Err(e) = target.add_member(session) {
                if !Arc::ptr_eq(&target, &self.lobby) && !session.is_terminated() {
                    warn!(room = %target.name(), session = %session, "target closed mid-move, falling back to lobby");
                    if let Err(e) = self.lobby.add_member(session) {
                        warn!(session = %session, error = %e, "lobby fallback failed");
                    }
                }
                return Err(e);
            }
            source
        };

        if let Some(source) = source {
            source.auto_cleanup();
        }
        Ok(())
    }

    /// Names of open rooms containing `query`, ignoring case, sorted.
    /// A missing or blank query lists every room.
    pub fn list_rooms(&self, query: Option<&str>) -> Vec<String> {
        let query = query.map(key).filter(|q| !q.is_empty());
        let mut names: Vec<String> = self
            .rooms
            .iter()
            .filter(|entry| query.as_deref().is_none_or(|q| entry.key().contains(q)))
            .map(|entry| entry.value().name().to_string())
            .collect();
        names.sort_by_key(|name| name.to_lowercase());
        names
    }

    /// Deregisters `room`, but only if it is the room registered under its
    /// name. The lobby is never removed.
    pub fn remove_room(&self, room: &Room) -> bool {
        if room.is_lobby() {
            return false;
        }
        let removed = self
            .rooms
            .remove_if(&key(room.name()), |_, registered| {
                std::ptr::eq(Arc::as_ptr(registered), room)
            })
            .is_some();
        if removed {
            info!(room = %room.name(), "room deregistered");
        }
        removed
    }

    /// Puts a session evicted from closing room `from` into the lobby,
    /// unless it has moved on or disconnected in the meantime.
    pub(crate) fn migrate_to_lobby(&self, session: &Arc<Session>, from: &str) {
        let _gate = session.lock_moves();
        let still_there = session
            .current_room()
            .is_some_and(|room| room.eq_ignore_ascii_case(from));
        if !still_there {
            debug!(session = %session, room = from, "skipping migration, session moved on");
            return;
        }
        if let Err(e) = self.lobby.add_member(session) {
            debug!(session = %session, error = %e, "migration to lobby failed");
        }
    }
}
