//! Room registry: seats, latest snapshots, dedup and expiry.
//!
//! The registry never looks inside a snapshot. Every operation returns the
//! messages it wants sent as a list of deliveries, so the same logic drives
//! the gRPC service and the in-process arena.

use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::clock::Clock;
use crate::engine::models::{ConnectionId, StateEnvelope};
use crate::relay::config::RelayConfig;
use crate::relay::processed::ProcessedActions;

/// Messages the relay sends to connections.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    RoomJoined {
        room_id: String,
        player_index: usize,
        connection_id: ConnectionId,
    },
    RoomFull {
        room_id: String,
    },
    GameStart {
        room_id: String,
    },
    SyncGameState(StateEnvelope),
    GameStateRequested {
        room_id: String,
        requester: ConnectionId,
    },
    ProvidedGameState(StateEnvelope),
    PlayerDisconnected {
        player_index: usize,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub to: ConnectionId,
    pub event: RelayEvent,
}

impl Delivery {
    fn new(to: &str, event: RelayEvent) -> Self {
        Self {
            to: to.to_string(),
            event,
        }
    }
}

#[derive(Debug)]
pub struct Room {
    id: String,
    seats: Vec<Option<ConnectionId>>,
    game_state: Option<StateEnvelope>,
    last_activity: u64,
    empty_since: Option<u64>,
    processed: ProcessedActions,
}

impl Room {
    fn new(id: &str, config: &RelayConfig, now: u64) -> Self {
        Self {
            id: id.to_string(),
            seats: vec![None; config.max_players],
            game_state: None,
            last_activity: now,
            empty_since: None,
            processed: ProcessedActions::new(config.processed_cap, config.processed_keep),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn seat_of(&self, conn: &str) -> Option<usize> {
        self.seats.iter().position(|s| s.as_deref() == Some(conn))
    }

    /// Seated connections in seat order.
    pub fn occupants(&self) -> impl Iterator<Item = &ConnectionId> {
        self.seats.iter().flatten()
    }

    pub fn player_count(&self) -> usize {
        self.occupants().count()
    }

    pub fn is_empty(&self) -> bool {
        self.seats.iter().all(Option::is_none)
    }

    pub fn is_full(&self) -> bool {
        self.seats.iter().all(Option::is_some)
    }

    pub fn game_state(&self) -> Option<&StateEnvelope> {
        self.game_state.as_ref()
    }

    pub fn last_activity(&self) -> u64 {
        self.last_activity
    }

    pub fn empty_since(&self) -> Option<u64> {
        self.empty_since
    }

    pub fn processed(&self) -> &ProcessedActions {
        &self.processed
    }

    fn broadcast(&self, event: &RelayEvent) -> Vec<Delivery> {
        self.occupants()
            .map(|to| Delivery::new(to, event.clone()))
            .collect()
    }
}

/// Registry of live rooms keyed by room id.
pub struct RoomRegistry {
    rooms: HashMap<String, Room>,
    config: RelayConfig,
    clock: Arc<dyn Clock>,
}

impl RoomRegistry {
    pub fn new(config: RelayConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            rooms: HashMap::new(),
            config,
            clock,
        }
    }

    /// Seat `conn` in `room_id`, creating the room on first join.
    ///
    /// A connection already seated there keeps its seat. A connection seated
    /// elsewhere leaves that room first.
    pub fn join(&mut self, conn: &str, room_id: &str) -> Vec<Delivery> {
        let now = self.clock.now_ms();
        if room_id.chars().count() < self.config.min_room_id_len {
            tracing::debug!(conn, room = room_id, "invalid room id");
            return vec![Delivery::new(
                conn,
                RelayEvent::Error {
                    message: "Invalid room ID".into(),
                },
            )];
        }

        if let Some(room) = self.rooms.get_mut(room_id) {
            if let Some(player_index) = room.seat_of(conn) {
                tracing::debug!(conn, room = room_id, player_index, "already seated");
                room.last_activity = now;
                let mut out = vec![Delivery::new(
                    conn,
                    RelayEvent::RoomJoined {
                        room_id: room_id.to_string(),
                        player_index,
                        connection_id: conn.to_string(),
                    },
                )];
                if let Some(state) = &room.game_state {
                    out.push(Delivery::new(conn, RelayEvent::SyncGameState(state.clone())));
                }
                return out;
            }
        }

        let mut out = Vec::new();
        if self.room_of(conn).is_some() {
            out.extend(self.leave(conn));
        }

        let config = &self.config;
        let room = self.rooms.entry(room_id.to_string()).or_insert_with(|| {
            tracing::info!(room = room_id, "creating room");
            Room::new(room_id, config, now)
        });
        room.last_activity = now;

        let Some(player_index) = room.seats.iter().position(Option::is_none) else {
            tracing::info!(conn, room = room_id, "room is full, rejecting");
            out.push(Delivery::new(
                conn,
                RelayEvent::RoomFull {
                    room_id: room_id.to_string(),
                },
            ));
            return out;
        };
        room.seats[player_index] = Some(conn.to_string());
        room.empty_since = None;
        tracing::info!(conn, room = room_id, player_index, "player joined");

        out.push(Delivery::new(
            conn,
            RelayEvent::RoomJoined {
                room_id: room_id.to_string(),
                player_index,
                connection_id: conn.to_string(),
            },
        ));
        if room.is_full() {
            tracing::info!(room = room_id, "room is full, starting game");
            out.extend(room.broadcast(&RelayEvent::GameStart {
                room_id: room_id.to_string(),
            }));
            if let Some(state) = &room.game_state {
                out.extend(room.broadcast(&RelayEvent::SyncGameState(state.clone())));
            }
        } else if let Some(state) = &room.game_state {
            out.push(Delivery::new(conn, RelayEvent::SyncGameState(state.clone())));
        }
        out
    }

    /// Vacate every seat held by `conn` and tell the remaining players.
    pub fn leave(&mut self, conn: &str) -> Vec<Delivery> {
        let now = self.clock.now_ms();
        let mut out = Vec::new();
        for room in self.rooms.values_mut() {
            let Some(player_index) = room.seat_of(conn) else {
                continue;
            };
            room.seats[player_index] = None;
            tracing::info!(conn, room = %room.id, player_index, "player left");
            out.extend(room.broadcast(&RelayEvent::PlayerDisconnected { player_index }));
            if room.is_empty() {
                tracing::info!(room = %room.id, "room is now empty");
                room.empty_since = Some(now);
            }
        }
        out
    }

    /// Store and rebroadcast a snapshot to every seat, sender included.
    ///
    /// A non-priority envelope whose action id was already processed is dropped.
    pub fn update_game_state(
        &mut self,
        conn: &str,
        room_id: &str,
        envelope: StateEnvelope,
    ) -> Vec<Delivery> {
        let now = self.clock.now_ms();
        let Some(room) = self.rooms.get_mut(room_id) else {
            tracing::debug!(conn, room = room_id, "room not found for game state update");
            return Vec::new();
        };
        if room.seat_of(conn).is_none() {
            tracing::debug!(conn, room = room_id, "update from a connection not in the room");
            return Vec::new();
        }
        room.last_activity = now;

        let priority = envelope.is_priority_update;
        if let Some(action_id) = envelope.action_id.as_deref() {
            if !priority && room.processed.contains(action_id) {
                tracing::debug!(room = room_id, action_id, "already processed, ignoring");
                return Vec::new();
            }
            room.processed.insert(action_id);
        }
        if priority {
            tracing::debug!(
                room = room_id,
                action_id = envelope.action_id.as_deref().unwrap_or(""),
                "priority update"
            );
        }

        let out = room.broadcast(&RelayEvent::SyncGameState(envelope.clone()));
        room.game_state = Some(envelope);
        out
    }

    /// Ask the other seated player for a fresh snapshot. With nobody else seated
    /// the stored snapshot is returned directly.
    pub fn request_game_state(&mut self, conn: &str, room_id: &str) -> Vec<Delivery> {
        let now = self.clock.now_ms();
        let Some(room) = self.rooms.get_mut(room_id) else {
            tracing::debug!(conn, room = room_id, "room not found for game state request");
            return Vec::new();
        };
        room.last_activity = now;

        let peers: Vec<ConnectionId> = room
            .occupants()
            .filter(|c| c.as_str() != conn)
            .cloned()
            .collect();
        if !peers.is_empty() {
            return peers
                .into_iter()
                .map(|to| Delivery {
                    to,
                    event: RelayEvent::GameStateRequested {
                        room_id: room_id.to_string(),
                        requester: conn.to_string(),
                    },
                })
                .collect();
        }
        match &room.game_state {
            Some(state) => vec![Delivery::new(conn, RelayEvent::SyncGameState(state.clone()))],
            None => {
                tracing::debug!(room = room_id, "no game state available");
                Vec::new()
            }
        }
    }

    /// Store a snapshot and hand it to `target` only, bypassing dedup.
    pub fn provide_game_state(
        &mut self,
        conn: &str,
        room_id: &str,
        envelope: StateEnvelope,
        target: &str,
    ) -> Vec<Delivery> {
        let now = self.clock.now_ms();
        let Some(room) = self.rooms.get_mut(room_id) else {
            tracing::debug!(conn, room = room_id, "room not found for game state provision");
            return Vec::new();
        };
        if room.seat_of(conn).is_none() {
            tracing::debug!(conn, room = room_id, "provision from a connection not in the room");
            return Vec::new();
        }
        room.last_activity = now;
        room.game_state = Some(envelope.clone());

        if room.seat_of(target).is_none() {
            tracing::debug!(conn, room = room_id, target, "provision target not in the room");
            return Vec::new();
        }
        vec![Delivery::new(target, RelayEvent::ProvidedGameState(envelope))]
    }

    /// Delete rooms idle past the idle TTL and rooms left empty past the grace period.
    /// Returns the deleted room ids.
    pub fn sweep_expired(&mut self) -> Vec<String> {
        let now = self.clock.now_ms();
        let idle_ms = self.config.idle_ttl_secs.saturating_mul(1000);
        let grace_ms = self.config.empty_grace_secs.saturating_mul(1000);

        let expired: Vec<String> = self
            .rooms
            .values()
            .filter(|room| {
                now.saturating_sub(room.last_activity) > idle_ms
                    || room
                        .empty_since
                        .is_some_and(|since| now.saturating_sub(since) >= grace_ms)
            })
            .map(|room| room.id.clone())
            .collect();
        for id in &expired {
            self.rooms.remove(id);
            tracing::info!(room = %id, "deleted expired room");
        }
        expired
    }

    pub fn has_empty_rooms(&self) -> bool {
        self.rooms.values().any(|r| r.empty_since.is_some())
    }

    pub fn room(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn room_snapshot(&self, room_id: &str) -> Option<&StateEnvelope> {
        self.rooms.get(room_id).and_then(Room::game_state)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Room in which `conn` holds a seat.
    pub fn room_of(&self, conn: &str) -> Option<&str> {
        self.rooms
            .values()
            .find(|r| r.seat_of(conn).is_some())
            .map(|r| r.id.as_str())
    }
}
