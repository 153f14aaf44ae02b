//! Chat Hub Daemon Binary
//!
//! A WebSocket server that fans chat events out to all connected
//! participants.
//!
//! # Usage
//!
//! ```bash
//! chat-hubd --port 8765
//! chat-hubd --port 8765 --host 127.0.0.1
//! ```

use std::time::Duration;

use clap::Parser;

use chat_hub::server::{run, ServerConfig};

/// Chat Hub Daemon
#[derive(Parser, Debug)]
#[command(name = "chat-hubd")]
#[command(about = "Real-time chat broadcast hub daemon")]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "CHAT_HUB_PORT", default_value = "8765")]
    port: u16,

    /// Host to bind to
    #[arg(long, env = "CHAT_HUB_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Heartbeat ping interval in seconds
    #[arg(long, default_value = "20")]
    ping_interval: u64,

    /// Heartbeat response timeout in seconds
    #[arg(long, default_value = "10")]
    ping_timeout: u64,

    /// Close-handshake timeout in seconds during shutdown
    #[arg(long, default_value = "10")]
    close_timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("chat_hub=info".parse().unwrap())
                .add_directive("chat_hubd=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    let config = ServerConfig {
        host: args.host,
        port: args.port,
        ping_interval: Duration::from_secs(args.ping_interval),
        ping_timeout: Duration::from_secs(args.ping_timeout),
        close_timeout: Duration::from_secs(args.close_timeout),
    };

    run(config).await
}
