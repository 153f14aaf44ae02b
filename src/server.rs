//! Server accept loop and graceful shutdown
//!
//! Binds the listener, spawns one session task per accepted connection, and
//! on a termination signal stops accepting, closes every live connection,
//! and waits (bounded by the close timeout) for in-flight cleanup.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::connection::handle_connection;
use crate::hub::ChatHub;

/// Transport-level configuration the core never inspects beyond plumbing it
/// to the session tasks.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Heartbeat ping interval.
    pub ping_interval: Duration,
    /// How long to wait for a pong before closing.
    pub ping_timeout: Duration,
    /// How long shutdown waits for close handshakes.
    pub close_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8765,
            ping_interval: Duration::from_secs(20),
            ping_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(10),
        }
    }
}

/// Run the hub until a termination signal arrives.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = TcpListener::bind(&addr).await?;
    info!("chat hub listening on ws://{}", addr);

    let hub = ChatHub::arc();
    let mut sessions = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    info!("accepted connection from {}", peer);
                    sessions.spawn(handle_connection(
                        stream,
                        Arc::clone(&hub),
                        config.clone(),
                    ));
                }
                Err(e) => {
                    error!("failed to accept connection: {}", e);
                }
            },
            _ = shutdown_signal() => {
                info!("shutdown signal received, no longer accepting connections");
                break;
            }
        }
    }

    drop(listener);
    hub.close_all();

    if !sessions.is_empty() {
        info!("waiting for {} session(s) to close", sessions.len());
        let drain = async {
            while sessions.join_next().await.is_some() {}
        };
        if tokio::time::timeout(config.close_timeout, drain).await.is_err() {
            warn!("close timeout elapsed, aborting remaining sessions");
            sessions.shutdown().await;
        }
    }

    info!("server shutdown complete");
    Ok(())
}

/// Resolves on SIGINT, or SIGTERM on unix. Transport closure is the only
/// cancellation signal sessions see; this covers the process itself.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
