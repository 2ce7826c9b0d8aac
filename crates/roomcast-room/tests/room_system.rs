//! Integration tests for rooms and the registry using in-memory sessions.
//!
//! Each test client is a real [`Session`] whose outbox receiver is kept in
//! the test, so deliveries can be inspected with `try_recv`. Dropping the
//! receiver makes every later send fail, which stands in for a broken
//! transport.

use std::sync::Arc;

use roomcast_protocol::{ClientId, Envelope, LOBBY};
use roomcast_room::{RoomError, RoomRegistry};
use roomcast_session::Session;
use roomcast_transport::ConnectionId;
use tokio::sync::mpsc::Receiver;

// =========================================================================
// Helpers
// =========================================================================

struct Client {
    session: Arc<Session>,
    rx: Receiver<Envelope>,
}

impl Client {
    fn id(&self) -> ClientId {
        self.session.client_id().unwrap()
    }

    /// Everything queued so far.
    fn drain(&mut self) -> Vec<Envelope> {
        let mut out = Vec::new();
        while let Ok(envelope) = self.rx.try_recv() {
            out.push(envelope);
        }
        out
    }

    /// Texts of the `MESSAGE`s queued so far.
    fn texts(&mut self) -> Vec<String> {
        self.drain()
            .into_iter()
            .filter_map(|envelope| match envelope {
                Envelope::Message { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }
}

fn named(id: u64, name: &str) -> Client {
    let (session, rx) = Session::channel(ConnectionId::new(id));
    session.set_name(name, || ClientId(id)).unwrap();
    Client {
        session: Arc::new(session),
        rx,
    }
}

/// A registry with the given clients in the lobby, queues emptied.
fn lobby_with(names: &[&str]) -> (Arc<RoomRegistry>, Vec<Client>) {
    let registry = RoomRegistry::new();
    let mut clients: Vec<Client> = names
        .iter()
        .enumerate()
        .map(|(i, name)| named(i as u64 + 1, name))
        .collect();
    for client in &clients {
        registry.join_room(LOBBY, &client.session).unwrap();
    }
    for client in &mut clients {
        client.drain();
    }
    (registry, clients)
}

// =========================================================================
// Registry
// =========================================================================

#[test]
fn test_registry_new_contains_only_lobby() {
    let registry = RoomRegistry::new();
    assert_eq!(registry.len(), 1);
    assert!(registry.lobby().is_lobby());
    assert_eq!(registry.list_rooms(None), vec![LOBBY.to_string()]);
}

#[test]
fn test_create_room_duplicate_ignoring_case_rejected() {
    let registry = RoomRegistry::new();
    registry.create_room("Trivia").unwrap();

    let err = registry.create_room("tRIVIA").unwrap_err();
    assert!(matches!(err, RoomError::AlreadyExists(_)));
    assert!(matches!(
        registry.create_room("LOBBY").unwrap_err(),
        RoomError::AlreadyExists(_)
    ));
    assert_eq!(registry.len(), 2);
}

#[test]
fn test_create_room_blank_name_rejected() {
    let registry = RoomRegistry::new();
    assert!(matches!(
        registry.create_room("   ").unwrap_err(),
        RoomError::InvalidName(_)
    ));
}

#[test]
fn test_get_room_ignores_case_keeps_spelling() {
    let registry = RoomRegistry::new();
    registry.create_room("Trivia").unwrap();

    let room = registry.get("TRIVIA").unwrap();
    assert_eq!(room.name(), "Trivia");
    assert!(registry.get("chess").is_none());
}

#[test]
fn test_join_room_missing_not_found() {
    let (registry, clients) = lobby_with(&["alice"]);
    let err = registry.join_room("nowhere", &clients[0].session).unwrap_err();
    assert!(matches!(err, RoomError::NotFound(_)));
    assert!(registry.lobby().contains(clients[0].id()));
}

#[test]
fn test_join_room_same_room_rejected() {
    let (registry, clients) = lobby_with(&["alice"]);
    let err = registry.join_room("Lobby", &clients[0].session).unwrap_err();
    assert!(matches!(err, RoomError::AlreadyMember(..)));
    assert_eq!(registry.lobby().len(), 1);
}

#[test]
fn test_list_rooms_substring_sorted() {
    let registry = RoomRegistry::new();
    for name in ["zeta-chat", "Alpha-Chat", "games"] {
        registry.create_room(name).unwrap();
    }

    assert_eq!(
        registry.list_rooms(Some("CHAT")),
        vec!["Alpha-Chat".to_string(), "zeta-chat".to_string()]
    );
    assert_eq!(registry.list_rooms(Some("")).len(), 4);
    assert!(registry.list_rooms(Some("poker")).is_empty());
}

#[test]
fn test_remove_room_only_matching_instance() {
    let registry = RoomRegistry::new();
    let first = registry.create_room("trivia").unwrap();
    first.close().unwrap();
    let second = registry.create_room("trivia").unwrap();

    assert!(!registry.remove_room(&first));
    assert!(registry.get("trivia").is_some());
    assert!(registry.remove_room(&second));
    assert!(registry.get("trivia").is_none());
    assert!(!registry.remove_room(&registry.lobby()));
}

// =========================================================================
// Membership
// =========================================================================

#[test]
fn test_add_member_then_remove_restores_size() {
    let (registry, mut clients) = lobby_with(&["alice"]);
    let lobby = registry.lobby();
    let bob = named(2, "bob");
    let before = lobby.len();

    lobby.add_member(&bob.session).unwrap();
    assert_eq!(lobby.len(), before + 1);
    lobby.remove_member(&bob.session).unwrap();
    assert_eq!(lobby.len(), before);

    // alice saw both the join and the leave
    let seen = clients[0].drain();
    assert!(matches!(seen[0], Envelope::RoomJoin { joined: true, .. }));
    assert!(matches!(seen[1], Envelope::RoomJoin { joined: false, .. }));
}

#[test]
fn test_add_member_announces_and_syncs_roster() {
    let (registry, mut clients) = lobby_with(&["alice"]);
    let mut bob = named(2, "bob");

    registry.lobby().add_member(&bob.session).unwrap();

    assert_eq!(
        clients[0].drain(),
        vec![Envelope::RoomJoin {
            id: ClientId(2),
            name: "bob".into(),
            room: LOBBY.into(),
            joined: true,
        }]
    );
    assert_eq!(
        bob.drain(),
        vec![
            Envelope::RoomJoin {
                id: ClientId(2),
                name: "bob".into(),
                room: LOBBY.into(),
                joined: true,
            },
            Envelope::SyncClient {
                id: ClientId(1),
                name: "alice".into(),
            },
        ]
    );
    assert_eq!(bob.session.current_room().as_deref(), Some(LOBBY));
}

#[test]
fn test_add_member_twice_rejected() {
    let (registry, clients) = lobby_with(&["alice"]);
    let err = registry.lobby().add_member(&clients[0].session).unwrap_err();
    assert!(matches!(err, RoomError::AlreadyMember(ClientId(1), _)));
    assert_eq!(registry.lobby().len(), 1);
}

#[test]
fn test_add_member_anonymous_rejected() {
    let registry = RoomRegistry::new();
    let (session, _rx) = Session::channel(ConnectionId::new(9));
    let err = registry.lobby().add_member(&Arc::new(session)).unwrap_err();
    assert!(matches!(err, RoomError::Anonymous));
    assert!(registry.lobby().is_empty());
}

#[test]
fn test_add_member_terminated_rejected() {
    let registry = RoomRegistry::new();
    let alice = named(1, "alice");
    alice.session.disconnect();

    let err = registry.lobby().add_member(&alice.session).unwrap_err();
    assert!(matches!(err, RoomError::SessionTerminated(_)));
    assert!(registry.lobby().is_empty());
}

#[test]
fn test_remove_member_not_member_no_change() {
    let (registry, _clients) = lobby_with(&["alice"]);
    let stranger = named(5, "stranger");
    let err = registry.lobby().remove_member(&stranger.session).unwrap_err();
    assert!(matches!(err, RoomError::NotMember(ClientId(5), _)));
    assert_eq!(registry.lobby().len(), 1);
}

#[test]
fn test_remove_member_announces_to_leaver() {
    let (registry, mut clients) = lobby_with(&["alice", "bob"]);
    registry.lobby().remove_member(&clients[1].session).unwrap();

    for client in &mut clients {
        assert_eq!(
            client.drain(),
            vec![Envelope::RoomJoin {
                id: ClientId(2),
                name: "bob".into(),
                room: LOBBY.into(),
                joined: false,
            }]
        );
    }
}

#[test]
fn test_force_disconnect_notifies_and_terminates() {
    let (registry, mut clients) = lobby_with(&["alice", "bob"]);
    registry.lobby().force_disconnect(&clients[0].session);

    let notice = Envelope::Disconnect {
        id: ClientId(1),
        name: "alice".into(),
    };
    assert_eq!(clients[1].drain(), vec![notice.clone()]);
    // queued before the outbox was dropped
    assert_eq!(clients[0].drain(), vec![notice]);
    assert!(clients[0].session.is_terminated());
    assert_eq!(registry.lobby().member_ids(), vec![ClientId(2)]);
}

#[test]
fn test_force_disconnect_last_member_closes_room() {
    let (registry, clients) = lobby_with(&["alice"]);
    let room = registry.create_room("quiet").unwrap();
    registry.join_room("quiet", &clients[0].session).unwrap();

    room.force_disconnect(&clients[0].session);

    assert!(!room.is_running());
    assert!(registry.get("quiet").is_none());
}

// =========================================================================
// Moves and lifecycle
// =========================================================================

#[test]
fn test_trivia_create_and_join_scenario() {
    let (registry, mut clients) = lobby_with(&["alice", "bob"]);
    let lobby = registry.lobby();

    lobby.handle_create_room(&clients[0].session, "trivia");
    let trivia = registry.get("trivia").unwrap();
    assert_eq!(trivia.member_ids(), vec![ClientId(1)]);

    lobby.handle_join_room(&clients[1].session, "TRIVIA");
    assert_eq!(trivia.member_ids(), vec![ClientId(1), ClientId(2)]);
    assert!(lobby.is_empty());

    let alice_seen = clients[0].drain();
    assert!(alice_seen.contains(&Envelope::RoomJoin {
        id: ClientId(2),
        name: "bob".into(),
        room: "trivia".into(),
        joined: true,
    }));
    let bob_seen = clients[1].drain();
    assert!(bob_seen.contains(&Envelope::SyncClient {
        id: ClientId(1),
        name: "alice".into(),
    }));

    trivia.handle_create_room(&clients[0].session, "Trivia");
    assert_eq!(clients[0].texts(), vec!["Room Trivia already exists"]);
    assert_eq!(registry.len(), 2);
}

#[test]
fn test_handle_join_room_missing_sends_notice() {
    let (registry, mut clients) = lobby_with(&["alice"]);
    registry.lobby().handle_join_room(&clients[0].session, "chess");
    assert_eq!(clients[0].texts(), vec!["Room chess doesn't exist"]);
}

#[test]
fn test_room_closes_when_last_member_leaves() {
    let (registry, clients) = lobby_with(&["alice"]);
    let room = registry.create_room("trivia").unwrap();
    registry.join_room("trivia", &clients[0].session).unwrap();

    registry.join_room(LOBBY, &clients[0].session).unwrap();

    assert!(!room.is_running());
    assert!(registry.get("trivia").is_none());
    assert!(registry.lobby().contains(ClientId(1)));
}

#[test]
fn test_lobby_never_closes() {
    let (registry, clients) = lobby_with(&["alice"]);
    let lobby = registry.lobby();

    lobby.remove_member(&clients[0].session).unwrap();
    assert!(lobby.is_empty());
    assert!(lobby.is_running());
    assert!(matches!(lobby.close(), Err(RoomError::LobbyPermanent)));
    assert!(registry.get(LOBBY).is_some());
}

#[test]
fn test_close_migrates_members_to_lobby() {
    let (registry, mut clients) = lobby_with(&["alice", "bob"]);
    let room = registry.create_room("trivia").unwrap();
    for client in &clients {
        registry.join_room("trivia", &client.session).unwrap();
    }
    for client in &mut clients {
        client.drain();
    }

    room.close().unwrap();

    assert!(registry.get("trivia").is_none());
    assert_eq!(registry.lobby().member_ids(), vec![ClientId(1), ClientId(2)]);
    for client in &mut clients {
        assert_eq!(client.session.current_room().as_deref(), Some(LOBBY));
        assert!(client
            .texts()
            .contains(&"Room is shutting down, migrating to lobby".to_string()));
    }
    assert!(room.add_member(&clients[0].session).is_err());
}

#[test]
fn test_session_in_at_most_one_room_under_concurrent_moves() {
    let (registry, clients) = lobby_with(&["alice", "bob", "carol", "dave"]);
    for name in ["red", "green", "blue"] {
        registry.create_room(name).unwrap();
    }
    // keep the rooms open while sessions hop around
    let anchors: Vec<Client> = ["red", "green", "blue"]
        .iter()
        .enumerate()
        .map(|(i, room)| {
            let anchor = named(100 + i as u64, &format!("anchor-{room}"));
            registry.join_room(room, &anchor.session).unwrap();
            anchor
        })
        .collect();

    let handles: Vec<_> = clients
        .iter()
        .enumerate()
        .map(|(i, client)| {
            let registry = Arc::clone(&registry);
            let session = Arc::clone(&client.session);
            std::thread::spawn(move || {
                let rooms = ["red", "green", "blue", LOBBY];
                for step in 0..200 {
                    let target = rooms[(i + step) % rooms.len()];
                    let _ = registry.join_room(target, &session);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for client in &clients {
        let homes: Vec<_> = ["red", "green", "blue", LOBBY]
            .iter()
            .filter(|room| registry.get(room).unwrap().contains(client.id()))
            .collect();
        assert_eq!(homes.len(), 1, "{} in {:?}", client.session, homes);
    }
    drop(anchors);
}

// =========================================================================
// Broadcast, mute and commands
// =========================================================================

#[test]
fn test_broadcast_applies_markup() {
    let (registry, mut clients) = lobby_with(&["alice", "bob"]);
    registry.lobby().broadcast(Some(ClientId(1)), "**hi** there");
    assert_eq!(
        clients[1].drain(),
        vec![Envelope::Message {
            id: ClientId(1),
            text: "<b>hi</b> there".into(),
        }]
    );
}

#[test]
fn test_broadcast_server_notice_uses_sentinel_id() {
    let (registry, mut clients) = lobby_with(&["alice"]);
    registry.lobby().broadcast(None, "maintenance soon");
    assert_eq!(
        clients[0].drain(),
        vec![Envelope::notice("maintenance soon")]
    );
}

#[test]
fn test_broadcast_failing_member_pruned() {
    let (registry, mut clients) = lobby_with(&["alice", "bob", "carol", "dave"]);
    let dave = clients.pop().unwrap();
    let Client { session: dave_session, rx } = dave;
    drop(rx);

    registry.lobby().broadcast(Some(ClientId(1)), "hello");

    // N - 1 successful deliveries
    for client in &mut clients {
        let seen = client.drain();
        assert_eq!(seen[0], Envelope::Message {
            id: ClientId(1),
            text: "hello".into(),
        });
        assert!(seen.contains(&Envelope::Disconnect {
            id: ClientId(4),
            name: "dave".into(),
        }));
    }
    assert!(dave_session.is_terminated());
    assert_eq!(registry.lobby().len(), 3);
    assert!(!registry.lobby().contains(ClientId(4)));
}

#[test]
fn test_broadcast_backlogged_member_pruned() {
    let (registry, mut clients) = lobby_with(&["alice", "bob", "carol"]);
    let lobby = registry.lobby();

    // room for its own join plus one SYNC_CLIENT per member, nothing more
    let (session, mut dave_rx) = Session::with_capacity(ConnectionId::new(4), 4);
    session.set_name("dave", || ClientId(4)).unwrap();
    let dave = Arc::new(session);
    registry.join_room(LOBBY, &dave).unwrap();
    for client in &mut clients {
        client.drain();
    }

    lobby.broadcast(Some(ClientId(1)), "hello");

    for client in &mut clients {
        let seen = client.drain();
        assert_eq!(seen[0], Envelope::Message {
            id: ClientId(1),
            text: "hello".into(),
        });
        assert!(seen.contains(&Envelope::Disconnect {
            id: ClientId(4),
            name: "dave".into(),
        }));
    }
    assert!(dave.is_terminated());
    assert_eq!(lobby.member_ids(), vec![ClientId(1), ClientId(2), ClientId(3)]);

    // the queue never grew past its bound
    let mut queued = 0;
    while dave_rx.try_recv().is_ok() {
        queued += 1;
    }
    assert_eq!(queued, 4);
}

#[test]
fn test_mute_hello_scenario() {
    let (registry, mut clients) = lobby_with(&["alice", "bob", "carol"]);
    let lobby = registry.lobby();

    lobby.handle_mute(&clients[1].session, "ALICE");
    assert_eq!(clients[0].texts(), vec!["bob muted you."]);
    assert_eq!(
        clients[1].drain(),
        vec![
            Envelope::MuteStatus {
                id: ClientId(1),
                muted: true,
            },
            Envelope::notice("alice has been muted."),
        ]
    );

    lobby.broadcast(Some(ClientId(1)), "hello");
    assert!(clients[1].drain().is_empty());
    assert_eq!(clients[2].texts(), vec!["hello"]);
    assert_eq!(clients[0].texts(), vec!["hello"]);

    lobby.handle_unmute(&clients[1].session, "alice");
    assert_eq!(clients[0].texts(), vec!["bob unmuted you."]);
    clients[1].drain();
    lobby.broadcast(Some(ClientId(1)), "hello again");
    assert_eq!(clients[1].texts(), vec!["hello again"]);
}

#[test]
fn test_mute_repeat_is_idempotent() {
    let (registry, mut clients) = lobby_with(&["alice", "bob"]);
    let lobby = registry.lobby();

    lobby.handle_mute(&clients[1].session, "alice");
    clients[0].drain();
    clients[1].drain();

    lobby.handle_mute(&clients[1].session, "alice");
    assert!(clients[0].drain().is_empty());
    assert!(clients[1].drain().is_empty());
    assert!(clients[1].session.is_muting(ClientId(1)));
}

#[test]
fn test_mute_unknown_user_not_found() {
    let (registry, mut clients) = lobby_with(&["alice"]);
    registry.lobby().handle_mute(&clients[0].session, "mallory");
    assert_eq!(clients[0].texts(), vec!["User not found."]);
}

#[test]
fn test_mute_target_in_other_room_not_found() {
    let (registry, mut clients) = lobby_with(&["alice", "bob"]);
    registry.create_room("side").unwrap();
    registry.join_room("side", &clients[1].session).unwrap();
    clients[0].drain();

    registry.lobby().handle_mute(&clients[0].session, "bob");
    assert_eq!(clients[0].texts(), vec!["User not found."]);
}

#[test]
fn test_private_message_delivered_and_echoed() {
    let (registry, mut clients) = lobby_with(&["alice", "bob", "carol"]);
    registry
        .lobby()
        .private_message(&clients[0].session, ClientId(2), "psst");

    let expected = Envelope::Message {
        id: ClientId(1),
        text: "alice (private): psst".into(),
    };
    assert_eq!(clients[0].drain(), vec![expected.clone()]);
    assert_eq!(clients[1].drain(), vec![expected]);
    assert!(clients[2].drain().is_empty());
}

#[test]
fn test_private_message_unknown_target_not_found() {
    let (registry, mut clients) = lobby_with(&["alice"]);
    registry
        .lobby()
        .private_message(&clients[0].session, ClientId(42), "anyone?");
    assert_eq!(clients[0].texts(), vec!["User not found."]);
}

#[test]
fn test_roll_two_d6_broadcast() {
    let (registry, mut clients) = lobby_with(&["alice", "bob"]);
    registry.lobby().roll(&clients[0].session, 2, 6);

    for client in &mut clients {
        let seen = client.drain();
        assert_eq!(seen.len(), 1);
        let Envelope::Roll {
            id,
            text,
            sides,
            rolls,
            total: Some(total),
        } = &seen[0]
        else {
            panic!("expected a roll result, got {seen:?}");
        };
        assert_eq!(*id, ClientId(1));
        assert_eq!((*sides, *rolls), (6, 2));
        assert!((2..=12).contains(total));
        assert_eq!(
            text,
            &format!("<b>alice (roll result): alice rolled 2d6 and got {total}</b>")
        );
    }
}

#[test]
fn test_roll_zero_sides_sends_notice() {
    let (registry, mut clients) = lobby_with(&["alice", "bob"]);
    registry.lobby().roll(&clients[0].session, 1, 0);
    assert_eq!(clients[0].texts(), vec!["cannot roll 1d0"]);
    assert!(clients[1].drain().is_empty());
}

#[test]
fn test_flip_respects_mute() {
    let (registry, mut clients) = lobby_with(&["alice", "bob", "carol"]);
    clients[2].session.mute(ClientId(1));

    registry.lobby().flip(&clients[0].session);

    let seen = clients[1].drain();
    let [Envelope::Flip { id, text }] = seen.as_slice() else {
        panic!("expected one flip, got {seen:?}");
    };
    assert_eq!(*id, ClientId(1));
    assert!(
        text == "<b>alice (flip result): alice flipped a coin and got heads</b>"
            || text == "<b>alice (flip result): alice flipped a coin and got tails</b>"
    );
    assert!(clients[2].drain().is_empty());
}

#[test]
fn test_handle_list_rooms_replies_with_matches() {
    let (registry, mut clients) = lobby_with(&["alice"]);
    registry.create_room("trivia").unwrap();

    registry.lobby().handle_list_rooms(&clients[0].session, "TRI");
    assert_eq!(
        clients[0].drain(),
        vec![Envelope::RoomList {
            query: "TRI".into(),
            rooms: vec!["trivia".into()],
            message: Some("1 room(s) found".into()),
        }]
    );

    registry.lobby().handle_list_rooms(&clients[0].session, "poker");
    assert_eq!(
        clients[0].drain(),
        vec![Envelope::RoomList {
            query: "poker".into(),
            rooms: vec![],
            message: Some("No rooms found matching your query".into()),
        }]
    );
}
