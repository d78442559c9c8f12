//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (target host)
//!     → router.rs (exact vhost lookup, then default entry)
//!     → Return: Backend(upstream) or Unroutable
//!
//! Route Compilation (at startup):
//!     backend | vhosts (config)
//!     → ProxyConfig::routing_table (one normalized table)
//!     → backend.rs (parse targets into upstreams)
//!     → Freeze as immutable HostRouter
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - Deterministic: same host always dispatches to the same backend
//! - Unknown hosts without a default get an explicit routing failure

pub mod backend;
pub mod router;

pub use backend::Upstream;
pub use router::{Dispatch, HostRouter, RouteError};
