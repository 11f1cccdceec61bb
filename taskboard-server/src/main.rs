//! Task board server: a single in-memory board shared over WebSocket.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:5001
//! cargo run --bin taskboard-server
//!
//! # Run on a custom port
//! cargo run --bin taskboard-server -- --port 8080
//!
//! # Or via environment variables
//! PORT=8080 FRONTEND_URL=http://localhost:5173 cargo run --bin taskboard-server
//! ```

use clap::Parser;
use taskboard_server::config::{ServerCliArgs, ServerConfig};
use taskboard_server::server;

#[tokio::main]
async fn main() {
    let cli = ServerCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match ServerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(
        addr = %config.bind_addr(),
        max_frame_size = config.max_frame_size,
        allowed_origin = config.allowed_origin.as_deref().unwrap_or("*"),
        "starting task board server"
    );

    match server::start_server_with_config(&config).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "task board server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "task board server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start task board server");
            std::process::exit(1);
        }
    }
}
