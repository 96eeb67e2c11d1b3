use std::path::PathBuf;
use std::sync::Arc;

use sdcam_api::AppState;
use sdcam_common::config::Config;
use tracing::{error, info};

/// Browse an existing storage root without capturing.
#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    let addr = config.server.addr();
    info!(
        addr,
        root = config.storage.root,
        read_chunk_bytes = config.storage.read_chunk_bytes,
        "sdcam API server starting"
    );

    let listener = match sdcam_api::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let state = Arc::new(AppState::from_config(&config.storage));
    if let Err(e) = sdcam_api::serve(listener, state).await {
        error!(error = %e, "server stopped");
        std::process::exit(1);
    }
}
