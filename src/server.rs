//! gRPC server implementation for RoomRelayService.
//!
//! Each `Session` stream is one connection. Inbound messages are fed to the
//! shared `RoomRegistry`; the deliveries it returns are fanned out through
//! per-connection channels. Closing the stream vacates the connection's seat.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};

use crate::engine::clock::{Clock, SystemClock};
use crate::engine::models::{ConnectionId, StateEnvelope};
use crate::relay::config::RelayConfig;
use crate::relay::registry::{Delivery, RelayEvent, RoomRegistry};

pub mod proto {
    tonic::include_proto!("azul.relay.v1");
}

use proto::room_relay_service_server::RoomRelayService;
use proto::{client_message, server_message, ClientMessage, ServerMessage};

type Outbound = mpsc::Sender<Result<ServerMessage, Status>>;

/// Registry plus the outbound channel of every live connection.
struct Hub {
    registry: RoomRegistry,
    senders: HashMap<ConnectionId, Outbound>,
}

impl Hub {
    /// Queue every delivery on its connection's channel.
    ///
    /// A connection whose queue is full or closed is evicted: its channel is
    /// dropped, which ends its stream once the client drains it, and it leaves
    /// its room so peers see `PlayerDisconnected`. The client reconnects and
    /// resyncs instead of silently missing snapshots. Returns whether anyone
    /// was evicted.
    fn deliver(&mut self, deliveries: Vec<Delivery>) -> bool {
        let mut evicted = false;
        let mut queue: VecDeque<Delivery> = deliveries.into();
        while let Some(Delivery { to, event }) = queue.pop_front() {
            let Some(tx) = self.senders.get(&to) else {
                tracing::debug!(conn = %to, "dropping message for closed connection");
                continue;
            };
            if let Err(e) = tx.try_send(Ok(event_to_proto(event))) {
                tracing::warn!(conn = %to, error = %e, "outbound queue unavailable, evicting connection");
                self.senders.remove(&to);
                queue.extend(self.registry.leave(&to));
                evicted = true;
            }
        }
        evicted
    }
}

/// The gRPC service implementation.
#[derive(Clone)]
pub struct RelayServer {
    hub: Arc<Mutex<Hub>>,
    next_conn: Arc<AtomicU64>,
    config: RelayConfig,
}

impl RelayServer {
    pub fn new(config: RelayConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: RelayConfig, clock: Arc<dyn Clock>) -> Self {
        let hub = Hub {
            registry: RoomRegistry::new(config.clone(), clock),
            senders: HashMap::new(),
        };
        Self {
            hub: Arc::new(Mutex::new(hub)),
            next_conn: Arc::new(AtomicU64::new(1)),
            config,
        }
    }

    pub async fn room_count(&self) -> usize {
        self.hub.lock().await.registry.room_count()
    }

    /// Periodic sweep of idle and abandoned rooms.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let hub = self.hub.clone();
        let period = self.config.sweep_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                sweep(&hub).await;
            }
        })
    }

    /// One-shot sweep just after the grace period, for rooms emptied right now.
    fn schedule_grace_sweep(&self) {
        let hub = self.hub.clone();
        let delay = self.config.empty_grace() + Duration::from_millis(50);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            sweep(&hub).await;
        });
    }

    async fn handle(&self, conn: &str, msg: ClientMessage) {
        let mut hub = self.hub.lock().await;
        if !hub.senders.contains_key(conn) {
            tracing::debug!(conn, "ignoring message from evicted connection");
            return;
        }
        let mut left_other_room = false;
        let deliveries = match msg.message {
            Some(client_message::Message::JoinRoom(join)) => {
                left_other_room = hub
                    .registry
                    .room_of(conn)
                    .is_some_and(|current| current != join.room_id);
                hub.registry.join(conn, &join.room_id)
            }
            Some(client_message::Message::RequestGameState(req)) => {
                hub.registry.request_game_state(conn, &req.room_id)
            }
            Some(client_message::Message::ProvideGameState(provide)) => {
                match envelope_from_proto(provide.envelope) {
                    Ok(envelope) => hub.registry.provide_game_state(
                        conn,
                        &provide.room_id,
                        envelope,
                        &provide.target_id,
                    ),
                    Err(message) => vec![error_for(conn, message)],
                }
            }
            Some(client_message::Message::UpdateGameState(update)) => {
                match envelope_from_proto(update.envelope) {
                    Ok(envelope) => hub.registry.update_game_state(conn, &update.room_id, envelope),
                    Err(message) => vec![error_for(conn, message)],
                }
            }
            None => vec![error_for(conn, "empty client message".into())],
        };
        let evicted = hub.deliver(deliveries);
        let schedule = (left_other_room || evicted) && hub.registry.has_empty_rooms();
        drop(hub);
        if schedule {
            self.schedule_grace_sweep();
        }
    }

    async fn disconnect(&self, conn: &str) {
        let mut hub = self.hub.lock().await;
        hub.senders.remove(conn);
        let deliveries = hub.registry.leave(conn);
        hub.deliver(deliveries);
        let schedule = hub.registry.has_empty_rooms();
        drop(hub);
        tracing::info!(conn, "client disconnected");
        if schedule {
            self.schedule_grace_sweep();
        }
    }
}

async fn sweep(hub: &Mutex<Hub>) {
    let removed = hub.lock().await.registry.sweep_expired();
    if !removed.is_empty() {
        tracing::info!(rooms = ?removed, "swept expired rooms");
    }
}

fn error_for(conn: &str, message: String) -> Delivery {
    Delivery {
        to: conn.to_string(),
        event: RelayEvent::Error { message },
    }
}

// --- Conversion helpers: protobuf <-> relay types ---

fn envelope_from_proto(envelope: Option<proto::StateEnvelope>) -> Result<StateEnvelope, String> {
    let envelope = envelope.ok_or_else(|| "missing state envelope".to_string())?;
    let state = serde_json::from_slice(&envelope.state_json)
        .map_err(|e| format!("invalid state JSON: {}", e))?;
    Ok(StateEnvelope {
        state,
        timestamp: envelope.timestamp,
        action_id: if envelope.action_id.is_empty() {
            None
        } else {
            Some(envelope.action_id)
        },
        is_priority_update: envelope.is_priority_update,
    })
}

fn envelope_to_proto(envelope: StateEnvelope) -> proto::StateEnvelope {
    proto::StateEnvelope {
        state_json: serde_json::to_vec(&envelope.state).unwrap_or_default(),
        timestamp: envelope.timestamp,
        action_id: envelope.action_id.unwrap_or_default(),
        is_priority_update: envelope.is_priority_update,
    }
}

fn event_to_proto(event: RelayEvent) -> ServerMessage {
    use server_message::Message;

    let message = match event {
        RelayEvent::RoomJoined {
            room_id,
            player_index,
            connection_id,
        } => Message::RoomJoined(proto::RoomJoined {
            room_id,
            player_index: player_index as u32,
            connection_id,
        }),
        RelayEvent::RoomFull { room_id } => Message::RoomFull(proto::RoomFull { room_id }),
        RelayEvent::GameStart { room_id } => Message::GameStart(proto::GameStart { room_id }),
        RelayEvent::SyncGameState(envelope) => Message::SyncGameState(proto::SyncGameState {
            envelope: Some(envelope_to_proto(envelope)),
        }),
        RelayEvent::GameStateRequested { room_id, requester } => {
            Message::GameStateRequested(proto::GameStateRequested {
                room_id,
                requester_id: requester,
            })
        }
        RelayEvent::ProvidedGameState(envelope) => {
            Message::ProvidedGameState(proto::ProvidedGameState {
                envelope: Some(envelope_to_proto(envelope)),
            })
        }
        RelayEvent::PlayerDisconnected { player_index } => {
            Message::PlayerDisconnected(proto::PlayerDisconnected {
                player_index: player_index as u32,
            })
        }
        RelayEvent::Error { message } => Message::Error(proto::Error { message }),
    };
    ServerMessage {
        message: Some(message),
    }
}

#[tonic::async_trait]
impl RoomRelayService for RelayServer {
    type SessionStream = ReceiverStream<Result<ServerMessage, Status>>;

    async fn session(
        &self,
        request: Request<Streaming<ClientMessage>>,
    ) -> Result<Response<Self::SessionStream>, Status> {
        let mut inbound = request.into_inner();
        let conn = format!("conn-{}", self.next_conn.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        self.hub.lock().await.senders.insert(conn.clone(), tx);
        tracing::info!(conn = %conn, "client connected");

        let server = self.clone();
        tokio::spawn(async move {
            loop {
                match inbound.message().await {
                    Ok(Some(msg)) => server.handle(&conn, msg).await,
                    Ok(None) => break,
                    Err(status) => {
                        tracing::debug!(conn = %conn, error = %status, "inbound stream error");
                        break;
                    }
                }
            }
            server.disconnect(&conn).await;
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_conversion_keeps_metadata() {
        let wire = proto::StateEnvelope {
            state_json: br#"{"current_player":1}"#.to_vec(),
            timestamp: 77,
            action_id: "c1-3".into(),
            is_priority_update: true,
        };
        let envelope = envelope_from_proto(Some(wire.clone())).unwrap();
        assert_eq!(envelope.state["current_player"], 1);
        assert_eq!(envelope.action_id.as_deref(), Some("c1-3"));
        assert_eq!(envelope_to_proto(envelope), wire);
    }

    #[test]
    fn test_empty_action_id_maps_to_none() {
        let wire = proto::StateEnvelope {
            state_json: b"{}".to_vec(),
            ..Default::default()
        };
        assert_eq!(envelope_from_proto(Some(wire)).unwrap().action_id, None);
    }

    #[test]
    fn test_malformed_state_is_rejected() {
        let wire = proto::StateEnvelope {
            state_json: b"{not json".to_vec(),
            ..Default::default()
        };
        let err = envelope_from_proto(Some(wire)).unwrap_err();
        assert!(err.starts_with("invalid state JSON"));
        assert!(envelope_from_proto(None).is_err());
    }

    fn message_kind(rx: &mut mpsc::Receiver<Result<ServerMessage, Status>>) -> server_message::Message {
        rx.try_recv()
            .expect("queued message")
            .expect("ok message")
            .message
            .expect("message body")
    }

    #[test]
    fn test_full_outbound_queue_evicts_connection() {
        use crate::engine::clock::ManualClock;

        let config = RelayConfig {
            channel_capacity: 1,
            ..RelayConfig::default()
        };
        let mut hub = Hub {
            registry: RoomRegistry::new(config, Arc::new(ManualClock::new(0))),
            senders: HashMap::new(),
        };
        let (tx_a, mut rx_a) = mpsc::channel(1);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        hub.senders.insert("conn-a".into(), tx_a);
        hub.senders.insert("conn-b".into(), tx_b);

        let joined = hub.registry.join("conn-a", "room1");
        assert!(!hub.deliver(joined));
        assert!(matches!(message_kind(&mut rx_a), server_message::Message::RoomJoined(_)));

        // GameStart fills conn-a's single slot and nobody reads it afterwards.
        let joined = hub.registry.join("conn-b", "room1");
        assert!(!hub.deliver(joined));

        let update = hub.registry.update_game_state(
            "conn-b",
            "room1",
            StateEnvelope {
                state: serde_json::json!({"value": 1}),
                timestamp: 0,
                action_id: Some("c1-1".into()),
                is_priority_update: true,
            },
        );
        assert!(hub.deliver(update));

        assert!(!hub.senders.contains_key("conn-a"));
        assert_eq!(hub.registry.room_of("conn-a"), None);
        assert!(matches!(message_kind(&mut rx_b), server_message::Message::RoomJoined(_)));
        assert!(matches!(message_kind(&mut rx_b), server_message::Message::GameStart(_)));
        assert!(matches!(message_kind(&mut rx_b), server_message::Message::SyncGameState(_)));
        match message_kind(&mut rx_b) {
            server_message::Message::PlayerDisconnected(p) => assert_eq!(p.player_index, 0),
            other => panic!("expected player_disconnected, got {other:?}"),
        }

        // The evicted client still drains what was queued, then its stream ends.
        assert!(matches!(message_kind(&mut rx_a), server_message::Message::GameStart(_)));
        assert!(matches!(
            rx_a.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_player_index_crosses_the_wire() {
        let msg = event_to_proto(RelayEvent::PlayerDisconnected { player_index: 1 });
        assert_eq!(
            msg.message,
            Some(server_message::Message::PlayerDisconnected(
                proto::PlayerDisconnected { player_index: 1 }
            ))
        );
    }
}
