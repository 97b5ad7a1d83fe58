use std::sync::Arc;

use ssehub::broker::Hub;
use ssehub::config::load_config;
use ssehub::transport::websocket::start_websocket_server;
use ssehub::utils::logging;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    if let Err(e) = run_server().await {
        eprintln!("Server failed: {e}");
        std::process::exit(1);
    }
}

async fn run_server() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let config = load_config()?;
    logging::init(&config.log.level);

    let hub = Arc::new(Hub::new());
    for name in &config.hub.public_topics {
        if let Err(e) = hub.register_public_topic(name) {
            warn!("Skipping public topic {name}: {e}");
        }
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);

    tokio::select! {
        res = start_websocket_server(&addr, hub) => {
            res?;
            error!("WebSocket server exited unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    Ok(())
}
