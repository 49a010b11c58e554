use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use subcmd_relay::config::ServerConfig;
use subcmd_relay::lobby::manager::LobbyManager;
use subcmd_relay::net::transport::RelayServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Subcommand relay v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::load_or_default();
    config.validate().map_err(anyhow::Error::msg)?;
    info!(
        "Configuration loaded: {}:{}, max_lobbies={}, lobby_capacity={}, broadcast_finish_load={}",
        config.bind_address,
        config.port,
        config.max_lobbies,
        config.lobby_capacity,
        config.broadcast_finish_load
    );

    let lobbies = Arc::new(Mutex::new(LobbyManager::new(
        config.max_lobbies,
        config.lobby_capacity,
    )));
    let server = RelayServer::new(config, lobbies.clone());

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = shutdown => {
            info!("Shutting down...");
        }
    }

    let manager = lobbies.lock();
    info!(
        "Relay stopped with {} lobbies, {} clients",
        manager.lobby_count(),
        manager.client_count()
    );

    Ok(())
}
