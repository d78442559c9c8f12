//! Client authentication subsystem.
//!
//! # Data Flow
//! ```text
//! TLS handshake (rustls)
//!     → net::tls::MutualTlsVerifier (chain of trust against the CA bundle)
//!     → verifier.rs (identity constraint on end-entity certificates)
//!     → accept: connection proceeds to HTTP
//!     → reject: handshake aborted with a generic alert
//! ```

pub mod verifier;

pub use verifier::{AuthError, ChainVerifier, IdentityConstraint, IdentityVerifier};
