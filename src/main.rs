use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tonic::transport::Server;
use tracing_subscriber::EnvFilter;

use azul_game_engine::relay::config::{load_config, load_default_config};
use azul_game_engine::server::proto::room_relay_service_server::RoomRelayServiceServer;
use azul_game_engine::server::RelayServer;

#[derive(Parser)]
#[command(name = "azul-relay", about = "Azul room relay gRPC server")]
struct Cli {
    /// Port to listen on
    #[arg(short, long, default_value = "50051", env = "AZUL_RELAY_PORT")]
    port: u16,

    /// Path to relay.toml (default: auto-discover)
    #[arg(long, env = "AZUL_RELAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => load_config(path).map_err(|e| format!("Failed to load config: {}", e))?,
        None => load_default_config(),
    };
    tracing::info!(
        max_players = config.max_players,
        idle_ttl_secs = config.idle_ttl_secs,
        empty_grace_secs = config.empty_grace_secs,
        "relay configuration loaded"
    );

    let server = RelayServer::new(config);
    let _sweeper = server.spawn_sweeper();

    let addr: SocketAddr = ([0, 0, 0, 0], cli.port).into();
    tracing::info!(%addr, "starting gRPC server");

    Server::builder()
        .add_service(RoomRelayServiceServer::new(server))
        .serve(addr)
        .await?;

    Ok(())
}
