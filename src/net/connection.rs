//! Per-connection session state.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Hold the verified peer certificate chain for the connection's lifetime
//! - Hold the connection slot, releasing it when the connection closes

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use rustls::pki_types::CertificateDer;
use tokio::sync::OwnedSemaphorePermit;

use crate::security::verifier::describe_subject;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// State of one authenticated connection.
///
/// Created after a successful handshake and attached to every request served
/// on that connection. Dropped together with the connection.
#[derive(Debug)]
pub struct ConnectionSession {
    id: ConnectionId,
    peer_addr: Option<SocketAddr>,
    peer_chain: Vec<CertificateDer<'static>>,
    subject: String,
    established: Instant,
    _slot: Option<OwnedSemaphorePermit>,
}

impl ConnectionSession {
    pub fn new(
        peer_addr: Option<SocketAddr>,
        peer_chain: Vec<CertificateDer<'static>>,
        slot: Option<OwnedSemaphorePermit>,
    ) -> Self {
        let subject = peer_chain
            .first()
            .map(describe_subject)
            .unwrap_or_else(|| "<none>".to_string());

        Self {
            id: ConnectionId::new(),
            peer_addr,
            peer_chain,
            subject,
            established: Instant::now(),
            _slot: slot,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Peer certificates, end-entity first.
    pub fn peer_chain(&self) -> &[CertificateDer<'static>] {
        &self.peer_chain
    }

    /// Subject of the client's end-entity certificate.
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        tracing::debug!(
            connection_id = %self.id,
            client = %self.subject,
            duration_ms = self.established.elapsed().as_millis() as u64,
            "Connection closed"
        );
    }
}
