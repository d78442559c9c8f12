//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Authenticated TLS connection
//!     → server.rs (Axum setup, HTTP/1.1 + HTTP/2, timeouts)
//!     → middleware/deadline.rs (absolute read and write deadlines)
//!     → request.rs (request ID, target host)
//!     → proxy.rs (host router decides backend, forward, stream back)
//!     → response.rs (404 / 502 / 504 when forwarding is impossible)
//! ```

pub mod middleware;
pub mod proxy;
pub mod request;
pub mod response;
pub mod server;

pub use proxy::{ForwardError, ProxyState};
pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::ProxyServer;
