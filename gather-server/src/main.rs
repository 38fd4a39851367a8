use std::sync::Arc;

use gather_server::{AppContext, ChatRoutes, Gateway, ServerConfig};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .init();

    let ctx = match AppContext::from_config(&config) {
        Ok(ctx) => Arc::new(ctx),
        Err(e) => {
            error!("Failed to open database {}: {}", config.database_path, e);
            std::process::exit(1);
        }
    };

    let ws_listener = match TcpListener::bind(&config.ws_addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {}: {}", config.ws_addr, e);
            std::process::exit(1);
        }
    };
    let http_listener = match TcpListener::bind(&config.http_addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {}: {}", config.http_addr, e);
            std::process::exit(1);
        }
    };

    info!("Gather gateway listening on {}", config.ws_addr);
    info!("Gather REST API listening on {}", config.http_addr);

    let gateway = Arc::new(Gateway::new(ctx.clone(), config.handshake_timeout));
    tokio::spawn(gateway.serve(ws_listener));

    if let Err(e) = axum::serve(http_listener, ChatRoutes::routes(ctx)).await {
        error!("REST server failed: {}", e);
        std::process::exit(1);
    }
}
