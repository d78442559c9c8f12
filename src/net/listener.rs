//! TCP listener setup.
//!
//! # Responsibilities
//! - Parse the configured listen address (`host:port` or `:port`)
//! - Bind the socket before any TLS or HTTP setup starts serving
//! - Hand a non-blocking std listener to the TLS server

use std::net::{Ipv6Addr, SocketAddr, TcpListener, ToSocketAddrs};

use thiserror::Error;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The listen address could not be parsed or resolved.
    #[error("Invalid listen address '{0}'")]
    Address(String),
    /// Failed to bind to address.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Resolve a listen address.
///
/// A bare `:port` listens on all interfaces; host names are resolved and
/// the first address wins.
pub fn parse_listen_address(listen: &str) -> Result<SocketAddr, ListenerError> {
    let listen = listen.trim();
    let invalid = || ListenerError::Address(listen.to_string());

    if let Some(port) = listen.strip_prefix(':') {
        let port: u16 = port.parse().map_err(|_| invalid())?;
        return Ok(SocketAddr::from((Ipv6Addr::UNSPECIFIED, port)));
    }

    if let Ok(addr) = listen.parse::<SocketAddr>() {
        return Ok(addr);
    }

    listen
        .to_socket_addrs()
        .map_err(|_| invalid())?
        .next()
        .ok_or_else(invalid)
}

/// Bind the listen address.
///
/// The returned listener is non-blocking, ready to be driven by Tokio.
pub fn bind(listen: &str) -> Result<TcpListener, ListenerError> {
    let addr = parse_listen_address(listen)?;
    let bind_err = |source| ListenerError::Bind { addr, source };

    let listener = match TcpListener::bind(addr) {
        Ok(listener) => listener,
        // Hosts without IPv6 still honor `:port`.
        Err(_) if addr.ip() == Ipv6Addr::UNSPECIFIED => {
            let v4 = SocketAddr::from(([0, 0, 0, 0], addr.port()));
            TcpListener::bind(v4).map_err(|source| ListenerError::Bind { addr: v4, source })?
        }
        Err(e) => return Err(bind_err(e)),
    };
    listener.set_nonblocking(true).map_err(bind_err)?;

    tracing::info!(
        address = %listener.local_addr().map_err(bind_err)?,
        "Listener bound"
    );
    Ok(listener)
}
