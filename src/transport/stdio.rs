//! Stdio transport for the MCP server.
//!
//! This transport uses standard input/output for communication,
//! which is the standard mode for CLI-based MCP integrations.

use crate::error::{DbError, DbResult};
use crate::mcp::MySqlService;
use crate::transport::{GRACEFUL_TIMEOUT, Transport, grace_period, wait_for_signal};
use rmcp::{ServiceExt, transport::stdio};
use tracing::{info, warn};

/// Stdio transport implementation.
///
/// This transport reads JSON-RPC messages from stdin and writes
/// responses to stdout as newline-delimited JSON-RPC.
pub struct StdioTransport {
    service: MySqlService,
}

impl StdioTransport {
    pub fn new(service: MySqlService) -> Self {
        Self { service }
    }
}

impl Transport for StdioTransport {
    async fn run(&self) -> DbResult<()> {
        info!("Starting MCP server with stdio transport");

        let running = self
            .service
            .clone()
            .serve(stdio())
            .await
            .map_err(|e| DbError::internal(format!("Failed to start stdio transport: {}", e)))?;

        let outcome = tokio::select! {
            result = running.waiting() => result
                .map(|_quit_reason| info!("Stdio session ended"))
                .map_err(|e| DbError::internal(format!("Stdio transport error: {}", e))),
            _ = wait_for_signal() => {
                info!("Shutdown signal received");
                tokio::select! {
                    _ = self.service.client().close() => {}
                    _ = grace_period(GRACEFUL_TIMEOUT) => std::process::exit(1),
                }
                // A pending stdin read keeps the runtime alive, so exit here
                std::process::exit(0)
            }
        };

        if let Err(e) = &outcome {
            warn!(error = %e, "Stdio transport failed");
        }
        self.service.client().close().await;
        outcome
    }

    fn name(&self) -> &'static str {
        "stdio"
    }
}
