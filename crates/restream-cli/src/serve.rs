//! Serve command implementation for the restream CLI.

use restream_server::ServerConfig;

use crate::colors::{BOLD, CYAN, GREEN, RESET};

/// Start the API server and block until Ctrl+C.
pub async fn execute(config: ServerConfig) -> anyhow::Result<()> {
    let addr = config.socket_addr()?;

    println!("\n{}restream{} - Relay Supervisor", BOLD, RESET);
    println!("{}", "─".repeat(50));
    println!("{}  ◆ API:{} http://{}/api/streams", CYAN, RESET, addr);
    println!("{}  ◆ WebSocket:{} ws://{}/ws", CYAN, RESET, addr);
    println!("{}  ◆ Origin:{} {}", CYAN, RESET, config.allowed_origin);
    println!("{}", "─".repeat(50));
    println!("{}Press Ctrl+C to stop{}", GREEN, RESET);
    println!();

    restream_server::serve(config).await?;

    Ok(())
}
