//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, or JSON by extension)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → passed by reference to the verifier, router and server constructors
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Two routing shapes (`backend` or `vhosts`), normalized by
//!   [`ProxyConfig::routing_table`]

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{BackendTarget, ObservabilityConfig, ProxyConfig, TimeoutConfig, TlsConfig};
pub use schema::DEFAULT_VHOST;
pub use validation::ValidationError;
