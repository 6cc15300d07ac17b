//! Room relay server binary
//!
//! Configuration comes from the environment (`PORT`, `RELAY_HOST`,
//! `RELAY_MAX_CONNECTIONS`, `RELAY_MAX_MESSAGE_SIZE`); logging from
//! `RUST_LOG`.

use room_relay::{RelayServer, ServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("room_relay=debug,tower_http=info")),
        )
        .init();

    let server = RelayServer::new(ServerConfig::from_env()?, ());
    tracing::info!(
        addr = %server.bind_addr(),
        max_message_size = server.config().max_message_size,
        "Starting room relay"
    );

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}
