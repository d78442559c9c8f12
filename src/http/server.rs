//! HTTPS server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the forwarding handler
//! - Wire up middleware (request ID, tracing, read/write deadlines)
//! - Serve HTTP/1.1 and HTTP/2 over the mutual-TLS acceptor
//! - Drain in-flight connections on shutdown

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{middleware, routing::any, Router};
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use hyper_util::rt::TokioTimer;
use rustls::ServerConfig;
use tokio::sync::broadcast::{self, error::RecvError};
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::{ProxyConfig, TimeoutConfig};
use crate::http::middleware::{enforce_deadlines, Deadlines};
use crate::http::proxy::{forward, ProxyState};
use crate::http::request::UuidRequestId;
use crate::net::acceptor::MutualTlsAcceptor;
use crate::routing::HostRouter;

/// The mutual-TLS reverse proxy.
pub struct ProxyServer {
    app: Router,
    tls: Arc<ServerConfig>,
    timeouts: TimeoutConfig,
    max_connections: usize,
}

impl ProxyServer {
    /// Assemble the server from its TLS configuration and host router.
    pub fn new(config: &ProxyConfig, tls: ServerConfig, router: HostRouter) -> Self {
        let state = ProxyState::new(router, &config.timeouts);
        let app = Self::build_router(&config.timeouts, state);

        Self {
            app,
            tls: Arc::new(tls),
            timeouts: config.timeouts.clone(),
            max_connections: config.max_connections,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(timeouts: &TimeoutConfig, state: ProxyState) -> Router {
        Router::new()
            .route("/{*path}", any(forward))
            .route("/", any(forward))
            .with_state(state)
            .layer(middleware::from_fn_with_state(
                Deadlines::from_config(timeouts),
                enforce_deadlines,
            ))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
    }

    /// Serve on `listener` until `shutdown` fires, then drain for at most
    /// `shutdown_grace_secs`.
    pub async fn run(
        self,
        listener: std::net::TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> io::Result<()> {
        let addr = listener.local_addr()?;
        let grace = Duration::from_secs(self.timeouts.shutdown_grace_secs);

        let handle = Handle::new();
        let drain = handle.clone();
        tokio::spawn(async move {
            if let Err(RecvError::Closed) = shutdown.recv().await {
                return;
            }
            tracing::info!(grace_secs = grace.as_secs(), "Draining connections");
            drain.graceful_shutdown(Some(grace));
        });

        let acceptor = MutualTlsAcceptor::new(
            RustlsConfig::from_config(self.tls),
            Duration::from_secs(self.timeouts.handshake_secs),
            self.max_connections,
        );

        let mut server = axum_server::from_tcp(listener).acceptor(acceptor).handle(handle);
        server
            .http_builder()
            .http1()
            .timer(TokioTimer::new())
            .header_read_timeout(Duration::from_secs(self.timeouts.read_header_secs));

        tracing::info!(
            address = %addr,
            max_connections = self.max_connections,
            "Proxy listening"
        );

        server
            .serve(self.app.into_make_service_with_connect_info::<SocketAddr>())
            .await?;

        tracing::info!("Proxy stopped");
        Ok(())
    }
}
