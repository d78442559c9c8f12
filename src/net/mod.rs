//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (bound socket)
//!     → acceptor.rs (connection slot, TLS handshake)
//!     → tls.rs (client certificate required, chain + identity verified)
//!     → connection.rs (session attached to the connection's requests)
//!     → Hand off to HTTP layer
//!
//! Connection States:
//!     Listening → Handshaking → Authenticated → Closed
//!                             ↘ Rejected
//! ```
//!
//! # Design Decisions
//! - A rejected handshake never reaches the HTTP layer
//! - The wire only sees a generic TLS alert; the reason is logged
//! - Connection slots bound concurrent connections

pub mod acceptor;
pub mod connection;
pub mod listener;
pub mod tls;
