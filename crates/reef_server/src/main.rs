//! Reef Arena - Room Server
//!
//! Usage: `reef_server [config.ron]`

use std::path::PathBuf;

use reef_server::ServerConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting Reef Arena room server");

    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => match ServerConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("{e}");
                std::process::exit(1);
            }
        },
        None => ServerConfig::default(),
    }
    .with_env_overrides();

    tracing::info!(
        port = config.port,
        maps = %config.maps_dir.display(),
        batch_size = config.batch_size,
        "Server configured"
    );

    if let Err(e) = reef_server::network::serve(config, rand::random()).await {
        tracing::error!("Server stopped: {e}");
        std::process::exit(1);
    }
}
