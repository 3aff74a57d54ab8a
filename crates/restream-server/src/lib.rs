//! restream HTTP server.
//!
//! Exposes the relay supervisor over HTTP and pushes job list updates to
//! WebSocket subscribers.
//!
//! # Architecture
//!
//! - **Config**: environment-driven settings for the server and pipelines
//! - **Routes**: start/stop/status/list handlers, `/ws` push endpoint
//! - **Notifier**: broadcast channel the supervisor publishes into
//! - **Protocol**: request, response and push message types

pub mod config;
pub mod error;
pub mod notifier;
pub mod protocol;
pub mod routes;

use std::sync::Arc;

use restream_core::Supervisor;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use notifier::StreamsBroadcaster;
pub use protocol::ServerMessage;
pub use routes::{AppState, create_router};

/// Run the server until Ctrl+C, then stop every relay.
pub async fn serve(config: ServerConfig) -> ServerResult<()> {
    let broadcaster = Arc::new(StreamsBroadcaster::default());
    let supervisor = Supervisor::new(config.supervisor.clone(), broadcaster.clone());
    let state = Arc::new(AppState::new(supervisor, broadcaster, &config.allowed_origin)?);

    let app = create_router(state.clone());
    let addr = config.socket_addr()?;

    tracing::info!("Starting restream server at http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Create shutdown signal channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    // Handle Ctrl+C: stop relays first, then close subscribers and the listener
    let shutdown_state = state.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal");
            let stopped = shutdown_state.supervisor.shutdown().await;
            tracing::info!("Stopped {} relay(s)", stopped);
            shutdown_state.close_connections();
            let _ = shutdown_tx.send(());
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        })
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}
