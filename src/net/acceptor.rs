//! Mutual-TLS connection acceptor.
//!
//! Wraps axum-server's rustls acceptor: waits for a connection slot, runs the
//! handshake (client certificate required), and attaches a
//! [`ConnectionSession`] to the connection's service so every request served
//! on it can see who the peer is.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::middleware::AddExtension;
use axum::Extension;
use axum_server::accept::Accept;
use axum_server::tls_rustls::{RustlsAcceptor, RustlsConfig};
use futures_util::future::BoxFuture;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio_rustls::server::TlsStream;
use tower::Layer;

use crate::net::connection::ConnectionSession;
use crate::observability::metrics;

/// Acceptor enforcing the connection limit and the mTLS handshake.
#[derive(Clone)]
pub struct MutualTlsAcceptor {
    inner: RustlsAcceptor,
    slots: Arc<Semaphore>,
}

impl MutualTlsAcceptor {
    pub fn new(config: RustlsConfig, handshake_timeout: Duration, max_connections: usize) -> Self {
        Self {
            inner: RustlsAcceptor::new(config).handshake_timeout(handshake_timeout),
            slots: Arc::new(Semaphore::new(max_connections)),
        }
    }
}

impl<S> Accept<TcpStream, S> for MutualTlsAcceptor
where
    S: Send + 'static,
{
    type Stream = TlsStream<TcpStream>;
    type Service = AddExtension<S, Arc<ConnectionSession>>;
    type Future = BoxFuture<'static, io::Result<(Self::Stream, Self::Service)>>;

    fn accept(&self, stream: TcpStream, service: S) -> Self::Future {
        let inner = self.inner.clone();
        let slots = Arc::clone(&self.slots);

        Box::pin(async move {
            // Backpressure: hold the TCP connection until a slot frees up.
            let slot = slots
                .acquire_owned()
                .await
                .map_err(|_| io::Error::other("connection slots closed"))?;
            let peer_addr = stream.peer_addr().ok();

            let (stream, service) = match inner.accept(stream, service).await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::info!(
                        peer_addr = ?peer_addr,
                        error = %e,
                        "TLS handshake rejected"
                    );
                    metrics::record_handshake("rejected");
                    return Err(e);
                }
            };

            let peer_chain = stream
                .get_ref()
                .1
                .peer_certificates()
                .map(|certs| certs.to_vec())
                .unwrap_or_default();
            let session = Arc::new(ConnectionSession::new(peer_addr, peer_chain, Some(slot)));

            tracing::debug!(
                connection_id = %session.id(),
                peer_addr = ?peer_addr,
                client = %session.subject(),
                "Client authenticated"
            );
            metrics::record_handshake("accepted");

            Ok((stream, Extension(session).layer(service)))
        })
    }
}
