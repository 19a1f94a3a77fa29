//! Transport layer for the MCP server.
//!
//! This module provides different transport implementations for the MCP protocol:
//! - Stdio: Standard input/output for CLI integration
//! - HTTP: Streamable HTTP for remote clients

pub mod http;
pub mod stdio;

pub use http::HttpTransport;
pub use stdio::StdioTransport;

use crate::error::DbResult;
use std::future::Future;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

/// Bound on shutdown work (draining HTTP streams, closing the pool) after
/// the first signal.
pub(crate) const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

/// Trait for MCP transport implementations.
///
/// Transports handle the low-level communication between the MCP server
/// and clients, abstracting away the protocol details.
pub trait Transport: Send + Sync {
    /// Start the transport and begin handling requests.
    ///
    /// This method should block until the transport is shut down. The
    /// database client is closed before it returns.
    fn run(&self) -> impl Future<Output = DbResult<()>> + Send;

    /// Get the name of this transport for logging.
    fn name(&self) -> &'static str;
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
///
/// A signal that cannot be installed is logged and never fires.
pub(crate) async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

/// Resolve once `grace` has passed or a second shutdown signal arrives.
///
/// Transports race their shutdown work against this and force an exit
/// when it wins.
pub(crate) async fn grace_period(grace: Duration) {
    info!(
        timeout_secs = grace.as_secs(),
        "Waiting for shutdown to finish (send signal again to force exit)..."
    );
    tokio::select! {
        _ = tokio::time::sleep(grace) => {
            warn!("Graceful shutdown timeout, forcing exit");
        }
        _ = wait_for_signal() => {
            warn!("Received second signal, forcing immediate exit");
        }
    }
}
