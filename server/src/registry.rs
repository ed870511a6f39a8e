//! Session tracking and message dispatch for the word game server
//!
//! This module owns all mutable game state:
//! - The session table binding each connection to one (room, name) pair
//! - The lazily created rooms, kept for the lifetime of the process
//! - The single randomness source used for every shuffle and pick
//!
//! All operations run to completion on the caller's thread and only queue
//! outbound frames on the [`Transport`], so the registry is driven by one
//! sequential event loop.

use crate::room::{Room, RoundError};
use crate::transport::{ConnectionId, Transport};
use crate::wordbank::WordBank;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{
    decode_client_message, encode_server_message, ClientMessage, ServerMessage, StartRequest,
    KICKED_NOTICE, NAME_TAKEN_NOTICE, PROTOCOL_VERSION,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// The (room, name) a connection is registered as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub room: String,
    pub name: String,
}

pub struct SessionRegistry<T: Transport> {
    /// Registered connections and where they sit
    sessions: HashMap<ConnectionId, Session>,
    /// Rooms by name, created on first reference
    rooms: HashMap<String, Room>,
    word_bank: Arc<WordBank>,
    rng: StdRng,
    transport: T,
}

impl<T: Transport> SessionRegistry<T> {
    /// Creates a registry whose randomness is seeded from the OS
    pub fn new(word_bank: Arc<WordBank>, transport: T) -> Self {
        Self::with_rng(word_bank, transport, StdRng::from_entropy())
    }

    /// Creates a registry with a caller-supplied randomness source
    pub fn with_rng(word_bank: Arc<WordBank>, transport: T, rng: StdRng) -> Self {
        Self {
            sessions: HashMap::new(),
            rooms: HashMap::new(),
            word_bank,
            rng,
            transport,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn session(&self, conn: ConnectionId) -> Option<&Session> {
        self.sessions.get(&conn)
    }

    pub fn room(&self, name: &str) -> Option<&Room> {
        self.rooms.get(name)
    }

    /// The room `conn` is registered in, if any
    pub fn room_of(&self, conn: ConnectionId) -> Option<&Room> {
        self.sessions
            .get(&conn)
            .and_then(|session| self.rooms.get(&session.room))
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Decodes one inbound frame and runs every action it carries
    ///
    /// Malformed frames are logged and dropped; the connection stays open.
    pub fn handle_payload(&mut self, conn: ConnectionId, payload: &[u8], now: Instant) {
        let actions = match decode_client_message(payload) {
            Ok(actions) => actions,
            Err(e) => {
                warn!("{}: ignoring message: {}", conn, e);
                return;
            }
        };

        for action in actions {
            match action {
                ClientMessage::Join { room, name } => {
                    info!("{}: registering as {} in {}", conn, name, room);
                    self.register(&room, &name, conn);
                }
                ClientMessage::StartRound(request) => {
                    info!("{}: start {:?}", conn, request);
                    self.start_round(conn, &request, now);
                }
                ClientMessage::Kick { name } => {
                    info!("{}: kicking {}", conn, name);
                    self.kick(conn, &name);
                }
            }
        }
    }

    /// Binds `conn` to `name` in `room_name`
    ///
    /// A different connection already holding the name is told its name was
    /// taken and dropped. If `conn` was registered elsewhere it leaves that
    /// slot first.
    pub fn register(&mut self, room_name: &str, name: &str, conn: ConnectionId) {
        if let Some(previous) = self.sessions.get(&conn).cloned() {
            if previous.room != room_name || previous.name != name {
                self.leave(conn, &previous);
            }
        }

        let prior = self
            .rooms
            .get(room_name)
            .and_then(|room| room.player_connection(name))
            .filter(|&prior| prior != conn);
        if let Some(prior) = prior {
            info!("{}: name {} in {} taken over by {}", prior, name, room_name, conn);
            self.unicast(
                prior,
                &ServerMessage::Notice {
                    msg: NAME_TAKEN_NOTICE.to_string(),
                },
            );
            self.sessions.remove(&prior);
            self.transport.disconnect(prior);
        }

        self.rooms
            .entry(room_name.to_string())
            .or_default()
            .set_player(name, conn);
        self.sessions.insert(
            conn,
            Session {
                room: room_name.to_string(),
                name: name.to_string(),
            },
        );
        self.broadcast_players(room_name);

        let welcome = match self.rooms.get(room_name) {
            Some(room) => ServerMessage::Welcome {
                room: room_name.to_string(),
                round: room.round(),
                players_in_round: room.players_in_round().to_vec(),
                words: room.shuffled_current_words(&mut self.rng),
                word: room.assigned_word(name).map(str::to_string),
                wordlists: self.word_bank.list_sizes(),
                version: PROTOCOL_VERSION.to_string(),
            },
            None => return,
        };
        self.unicast(conn, &welcome);
    }

    /// Forgets a closed connection
    pub fn unregister(&mut self, conn: ConnectionId) {
        let Some(session) = self.sessions.remove(&conn) else {
            debug!("{}: closed without a session", conn);
            return;
        };
        info!("{}: {} left {}", conn, session.name, session.room);
        self.leave(conn, &session);
    }

    // Removes `conn` from its room slot, unless a newer connection has since
    // taken the name, and tells the room.
    fn leave(&mut self, conn: ConnectionId, session: &Session) {
        self.sessions.remove(&conn);

        if let Some(room) = self.rooms.get_mut(&session.room) {
            match room.player_connection(&session.name) {
                Some(current) if current == conn => {
                    room.remove_player(&session.name);
                }
                Some(current) => {
                    debug!(
                        "{}: name {} already belongs to {}, leaving it in place",
                        conn, session.name, current
                    );
                }
                None => {
                    warn!(
                        "{}: session named {} but {} has no such player",
                        conn, session.name, session.room
                    );
                }
            }
        }

        self.broadcast_players(&session.room);
    }

    /// Removes `target` from the requester's room
    pub fn kick(&mut self, requester: ConnectionId, target: &str) {
        let Some(room_name) = self.sessions.get(&requester).map(|s| s.room.clone()) else {
            debug!("{}: kick without a session", requester);
            return;
        };

        let removed = self
            .rooms
            .get_mut(&room_name)
            .and_then(|room| room.remove_player(target));

        if let Some(victim) = removed {
            self.unicast(
                victim,
                &ServerMessage::Notice {
                    msg: KICKED_NOTICE.to_string(),
                },
            );
            if self.sessions.remove(&victim).is_none() {
                warn!("{}: {} had a room slot but no session", victim, target);
            }
            self.transport.disconnect(victim);
        }

        self.broadcast_players(&room_name);
    }

    /// Tries to start the next round in the requester's room and, on
    /// success, sends every member their view of it
    pub fn start_round(&mut self, requester: ConnectionId, request: &StartRequest, now: Instant) {
        let Some(room_name) = self.sessions.get(&requester).map(|s| s.room.clone()) else {
            warn!("{}: start requested without a session", requester);
            return;
        };
        let Some(room) = self.rooms.get_mut(&room_name) else {
            warn!("{}: session points at missing room {}", requester, room_name);
            return;
        };

        match room.start_round(&self.word_bank, request, now, &mut self.rng) {
            Ok(round) => {
                info!(
                    "Room {} started round {} with {} players",
                    room_name,
                    round,
                    room.player_count()
                );
            }
            Err(e @ (RoundError::OutOfSync { .. } | RoundError::TooSoon)) => {
                info!("Room {}: start rejected: {}", room_name, e);
                return;
            }
            Err(e) => {
                warn!("Room {}: bad start request: {}", room_name, e);
                return;
            }
        }

        let Some(room) = self.rooms.get(&room_name) else {
            return;
        };
        let updates: Vec<(ConnectionId, ServerMessage)> = room
            .named_connections()
            .into_iter()
            .map(|(name, conn)| {
                let message = ServerMessage::RoundStarted {
                    round: room.round(),
                    players_in_round: room.players_in_round().to_vec(),
                    words: room.shuffled_current_words(&mut self.rng),
                    word: room.assigned_word(&name).map(str::to_string),
                };
                (conn, message)
            })
            .collect();

        for (conn, message) in updates {
            self.unicast(conn, &message);
        }
    }

    fn broadcast_players(&mut self, room_name: &str) {
        let Some(room) = self.rooms.get(room_name) else {
            return;
        };
        let message = ServerMessage::Players {
            players: room.player_names(),
        };
        let recipients = room.connections();
        self.broadcast(&recipients, &message);
    }

    /// Sends one message to many connections; a failed send does not stop
    /// the rest
    pub fn broadcast(&mut self, recipients: &[ConnectionId], message: &ServerMessage) {
        let payload = match encode_server_message(message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode broadcast: {}", e);
                return;
            }
        };

        for &conn in recipients {
            if let Err(e) = self.transport.send(conn, &payload) {
                warn!("Failed to send to {}: {}", conn, e);
            }
        }
    }

    pub fn unicast(&mut self, conn: ConnectionId, message: &ServerMessage) {
        self.broadcast(&[conn], message);
    }
}
