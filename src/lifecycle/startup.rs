//! Startup orchestration.
//!
//! Order: metrics exporter, listener, signal watcher, then the server
//! (which owns the janitor). Any startup error is fatal.

use std::net::SocketAddr;

use tokio::net::TcpListener;

use crate::config::GatewayConfig;
use crate::http::{GatewayServer, ServerError};
use crate::lifecycle::{signals::wait_for_signal, Shutdown};
use crate::observability::metrics;

/// Run the gateway until a termination signal is received.
pub async fn run(config: GatewayConfig) -> Result<(), ServerError> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = GatewayServer::new(config)?;
    let listener = TcpListener::bind(&server.config().listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        trigger.trigger();
    });

    server.run(listener, server_shutdown).await
}
