//! Mutually authenticated TLS reverse proxy library.
//!
//! Terminates TLS with a mandatory client certificate, checks the client's
//! identity during the handshake and forwards each request to the backend
//! of its virtual host.

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod routing;
pub mod security;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use http::ProxyServer;
pub use lifecycle::Shutdown;
