//! HTTP transport with Streamable HTTP support for the MCP server.
//!
//! This transport uses HTTP with SSE streaming responses,
//! which is suitable for remote MCP integrations.

use crate::auth::{AuthConfig, auth_middleware};
use crate::error::{DbError, DbResult};
use crate::mcp::MySqlService;
use crate::transport::{GRACEFUL_TIMEOUT, Transport, grace_period, wait_for_signal};
use axum::http::{Method, Request, Response};
use rmcp::transport::streamable_http_server::{
    StreamableHttpService, session::local::LocalSessionManager,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::{MakeSpan, OnResponse, TraceLayer};
use tracing::{Span, error, info, info_span};

/// Opens one span per request; CORS preflights get none.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RequestSpan;

impl<B> MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        if request.method() == Method::OPTIONS {
            return Span::none();
        }
        info_span!(
            "http_request",
            method = %request.method(),
            path = %request.uri().path(),
        )
    }
}

/// Logs status and latency inside the request span.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct LogResponse;

impl<B> OnResponse<B> for LogResponse {
    fn on_response(self, response: &Response<B>, latency: Duration, span: &Span) {
        if span.is_none() {
            return;
        }
        info!(
            parent: span,
            status = response.status().as_u16(),
            duration_ms = latency.as_millis() as u64,
            "HTTP request completed"
        );
    }
}

/// HTTP transport implementation with Streamable HTTP support.
///
/// This transport provides:
/// - HTTP endpoints for MCP protocol messages
/// - Server-Sent Events for streaming responses
/// - Optional bearer token authentication and CORS
pub struct HttpTransport {
    service: MySqlService,
    host: String,
    port: u16,
    endpoint: String,
    auth: Arc<AuthConfig>,
    cors: bool,
}

impl HttpTransport {
    /// Create a new HTTP transport without authentication or CORS.
    pub fn new(
        service: MySqlService,
        host: impl Into<String>,
        port: u16,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            service,
            host: host.into(),
            port,
            endpoint: endpoint.into(),
            auth: Arc::new(AuthConfig::disabled()),
            cors: false,
        }
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = Arc::new(auth);
        self
    }

    pub fn with_cors(mut self, enabled: bool) -> Self {
        self.cors = enabled;
        self
    }

    /// Get the bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the MCP endpoint path.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Build the axum router serving the MCP endpoint.
    pub fn router(&self) -> axum::Router {
        let prototype = self.service.clone();
        let service = StreamableHttpService::new(
            move || Ok(prototype.clone()),
            LocalSessionManager::default().into(),
            Default::default(),
        );

        // nest_service doesn't support the root path
        let mut app = if self.endpoint == "/" {
            axum::Router::new().fallback_service(service)
        } else {
            axum::Router::new().nest_service(&self.endpoint, service)
        };

        if self.auth.is_enabled() {
            info!(tokens = self.auth.token_count(), "Bearer token authentication enabled");
            app = app.layer(axum::middleware::from_fn_with_state(
                Arc::clone(&self.auth),
                auth_middleware,
            ));
        }
        app = app.layer(
            TraceLayer::new_for_http()
                .make_span_with(RequestSpan)
                .on_request(())
                .on_response(LogResponse),
        );
        // Added last so preflight requests are answered before authentication
        if self.cors {
            app = app.layer(CorsLayer::permissive());
        }
        app
    }
}

impl Transport for HttpTransport {
    async fn run(&self) -> DbResult<()> {
        let bind_addr = self.bind_addr();
        info!("Starting MCP server with HTTP transport on {}", bind_addr);

        let app = self.router();

        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            DbError::connection(
                format!("Failed to bind to {}: {}", bind_addr, e),
                "Check that the port is available",
            )
        })?;

        info!(endpoint = %self.endpoint, "MCP endpoint ready");

        let shutdown_notify = Arc::new(tokio::sync::Notify::new());
        let shutdown_notify_clone = shutdown_notify.clone();

        let shutdown_signal = async move {
            wait_for_signal().await;
            shutdown_notify_clone.notify_one();
        };

        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal);

        // SSE connections may keep the server alive indefinitely, so a forced
        // exit follows the timeout or a second signal
        let result = tokio::select! {
            result = server => {
                match result {
                    Ok(()) => {
                        info!("HTTP server stopped");
                        Ok(())
                    }
                    Err(e) => {
                        error!(error = %e, "HTTP server error");
                        Err(DbError::internal(format!("HTTP server error: {}", e)))
                    }
                }
            }
            _ = async {
                shutdown_notify.notified().await;
                grace_period(GRACEFUL_TIMEOUT).await;
            } => Ok(()),
        };

        self.service.client().close().await;
        result
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
