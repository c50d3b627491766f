//! End-to-end tests of the gRPC room relay over a real socket.

use std::net::SocketAddr;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tonic::transport::Server;
use tonic::Streaming;

use azul_game_engine::engine::plugin::GamePlugin;
use azul_game_engine::games::azul::plugin::AzulPlugin;
use azul_game_engine::games::azul::types::GameState;
use azul_game_engine::relay::config::RelayConfig;
use azul_game_engine::server::proto::room_relay_service_client::RoomRelayServiceClient;
use azul_game_engine::server::proto::room_relay_service_server::RoomRelayServiceServer;
use azul_game_engine::server::proto::{
    client_message, server_message, ClientMessage, JoinRoom, ProvideGameState, RequestGameState,
    ServerMessage, StateEnvelope, UpdateGameState,
};
use azul_game_engine::server::RelayServer;

const ROOM: &str = "table-1";

async fn start_relay() -> SocketAddr {
    serve(RelayServer::new(RelayConfig::default())).await
}

async fn serve(server: RelayServer) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        Server::builder()
            .add_service(RoomRelayServiceServer::new(server))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });
    addr
}

struct TestClient {
    tx: mpsc::Sender<ClientMessage>,
    inbound: Streaming<ServerMessage>,
}

impl TestClient {
    async fn open(addr: SocketAddr) -> Self {
        let mut client = RoomRelayServiceClient::connect(format!("http://{}", addr))
            .await
            .unwrap();
        let (tx, rx) = mpsc::channel(16);
        let inbound = client
            .session(ReceiverStream::new(rx))
            .await
            .unwrap()
            .into_inner();
        Self { tx, inbound }
    }

    async fn send(&self, message: client_message::Message) {
        self.tx
            .send(ClientMessage {
                message: Some(message),
            })
            .await
            .unwrap();
    }

    async fn join(&self, room_id: &str) {
        self.send(client_message::Message::JoinRoom(JoinRoom {
            room_id: room_id.to_string(),
        }))
        .await;
    }

    async fn update(&self, envelope: StateEnvelope) {
        self.send(client_message::Message::UpdateGameState(UpdateGameState {
            room_id: ROOM.to_string(),
            envelope: Some(envelope),
        }))
        .await;
    }

    async fn recv(&mut self) -> server_message::Message {
        let msg = tokio::time::timeout(Duration::from_secs(5), self.inbound.message())
            .await
            .expect("timed out waiting for relay")
            .unwrap()
            .expect("relay closed the stream");
        msg.message.expect("empty server message")
    }
}

fn initial_state(seed: u64) -> GameState {
    AzulPlugin.create_initial_state(&mut StdRng::seed_from_u64(seed))
}

fn envelope(state: &GameState, action_id: &str) -> StateEnvelope {
    StateEnvelope {
        state_json: serde_json::to_vec(state).unwrap(),
        timestamp: 1,
        action_id: action_id.to_string(),
        is_priority_update: false,
    }
}

fn sync_action_id(msg: server_message::Message) -> String {
    match msg {
        server_message::Message::SyncGameState(sync) => sync.envelope.unwrap().action_id,
        other => panic!("expected sync_game_state, got {:?}", other),
    }
}

/// Seat two clients in `ROOM` and drain the join traffic. Returns their connection ids.
async fn seat_pair(a: &mut TestClient, b: &mut TestClient) -> (String, String) {
    a.join(ROOM).await;
    let a_id = match a.recv().await {
        server_message::Message::RoomJoined(joined) => {
            assert_eq!(joined.player_index, 0);
            assert_eq!(joined.room_id, ROOM);
            joined.connection_id
        }
        other => panic!("expected room_joined, got {:?}", other),
    };

    b.join(ROOM).await;
    let b_id = match b.recv().await {
        server_message::Message::RoomJoined(joined) => {
            assert_eq!(joined.player_index, 1);
            joined.connection_id
        }
        other => panic!("expected room_joined, got {:?}", other),
    };
    for client in [a, b] {
        assert!(matches!(
            client.recv().await,
            server_message::Message::GameStart(_)
        ));
    }
    assert_ne!(a_id, b_id);
    (a_id, b_id)
}

#[tokio::test]
async fn test_two_players_join_and_start() {
    let server = RelayServer::new(RelayConfig::default());
    let addr = serve(server.clone()).await;
    assert_eq!(server.room_count().await, 0);
    let mut a = TestClient::open(addr).await;
    let mut b = TestClient::open(addr).await;
    seat_pair(&mut a, &mut b).await;
    assert_eq!(server.room_count().await, 1);

    let mut c = TestClient::open(addr).await;
    c.join(ROOM).await;
    match c.recv().await {
        server_message::Message::RoomFull(full) => assert_eq!(full.room_id, ROOM),
        other => panic!("expected room_full, got {:?}", other),
    }
}

#[tokio::test]
async fn test_short_room_id_is_rejected() {
    let addr = start_relay().await;
    let mut a = TestClient::open(addr).await;
    a.join("abc").await;
    match a.recv().await {
        server_message::Message::Error(err) => assert_eq!(err.message, "Invalid room ID"),
        other => panic!("expected error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_update_reaches_both_seats_and_duplicates_are_dropped() {
    let addr = start_relay().await;
    let mut a = TestClient::open(addr).await;
    let mut b = TestClient::open(addr).await;
    seat_pair(&mut a, &mut b).await;

    let state = initial_state(3);
    a.update(envelope(&state, "c0-1")).await;
    assert_eq!(sync_action_id(a.recv().await), "c0-1");
    let received = b.recv().await;
    match &received {
        server_message::Message::SyncGameState(sync) => {
            let bytes = &sync.envelope.as_ref().unwrap().state_json;
            let decoded: GameState = serde_json::from_slice(bytes).unwrap();
            assert_eq!(
                AzulPlugin.important_view(&decoded),
                AzulPlugin.important_view(&state)
            );
        }
        other => panic!("expected sync_game_state, got {:?}", other),
    }

    // The replay of c0-1 is swallowed, so the next thing b sees is c0-2.
    a.update(envelope(&state, "c0-1")).await;
    a.update(envelope(&state, "c0-2")).await;
    assert_eq!(sync_action_id(b.recv().await), "c0-2");
    assert_eq!(sync_action_id(a.recv().await), "c0-2");
}

#[tokio::test]
async fn test_priority_update_bypasses_dedup() {
    let addr = start_relay().await;
    let mut a = TestClient::open(addr).await;
    let mut b = TestClient::open(addr).await;
    seat_pair(&mut a, &mut b).await;

    let state = initial_state(5);
    a.update(envelope(&state, "c0-1")).await;
    assert_eq!(sync_action_id(b.recv().await), "c0-1");

    let mut priority = envelope(&state, "c0-1");
    priority.is_priority_update = true;
    a.update(priority).await;
    match b.recv().await {
        server_message::Message::SyncGameState(sync) => {
            assert!(sync.envelope.unwrap().is_priority_update);
        }
        other => panic!("expected sync_game_state, got {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_snapshot_gets_error() {
    let addr = start_relay().await;
    let mut a = TestClient::open(addr).await;
    let mut b = TestClient::open(addr).await;
    seat_pair(&mut a, &mut b).await;

    a.update(StateEnvelope {
        state_json: b"{oops".to_vec(),
        timestamp: 1,
        action_id: "c0-1".into(),
        is_priority_update: false,
    })
    .await;
    match a.recv().await {
        server_message::Message::Error(err) => {
            assert!(err.message.starts_with("invalid state JSON"));
        }
        other => panic!("expected error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_resync_goes_through_peer() {
    let addr = start_relay().await;
    let mut a = TestClient::open(addr).await;
    let mut b = TestClient::open(addr).await;
    let (_, b_id) = seat_pair(&mut a, &mut b).await;

    b.send(client_message::Message::RequestGameState(RequestGameState {
        room_id: ROOM.to_string(),
    }))
    .await;
    let requester = match a.recv().await {
        server_message::Message::GameStateRequested(req) => req.requester_id,
        other => panic!("expected game_state_requested, got {:?}", other),
    };
    assert_eq!(requester, b_id);

    let state = initial_state(11);
    let mut provided = envelope(&state, "");
    provided.timestamp = 99;
    a.send(client_message::Message::ProvideGameState(ProvideGameState {
        room_id: ROOM.to_string(),
        envelope: Some(provided),
        target_id: requester,
    }))
    .await;
    match b.recv().await {
        server_message::Message::ProvidedGameState(p) => {
            assert_eq!(p.envelope.unwrap().timestamp, 99);
        }
        other => panic!("expected provided_game_state, got {:?}", other),
    }
}

#[tokio::test]
async fn test_disconnect_notifies_peer() {
    let addr = start_relay().await;
    let mut a = TestClient::open(addr).await;
    let mut b = TestClient::open(addr).await;
    seat_pair(&mut a, &mut b).await;

    drop(a);
    match b.recv().await {
        server_message::Message::PlayerDisconnected(p) => assert_eq!(p.player_index, 0),
        other => panic!("expected player_disconnected, got {:?}", other),
    }

    // The vacated seat is the lowest free one again.
    let mut c = TestClient::open(addr).await;
    c.join(ROOM).await;
    match c.recv().await {
        server_message::Message::RoomJoined(joined) => assert_eq!(joined.player_index, 0),
        other => panic!("expected room_joined, got {:?}", other),
    }
}
