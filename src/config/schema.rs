//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Virtual-host key that selects the fallback backend.
pub const DEFAULT_VHOST: &str = "";

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Bind address (e.g., "0.0.0.0:9101" or ":9101").
    pub listen: String,

    /// Identity every client leaf certificate must be valid for.
    /// Empty means any certificate trusted by the CA bundle is accepted.
    pub required_client_name: String,

    /// Maximum concurrent client connections (backpressure).
    pub max_connections: usize,

    /// Single-backend shape: every host goes to this backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendTarget>,

    /// Server certificate, key and client trust anchor.
    pub tls: TlsConfig,

    /// Multi-vhost shape: host name to backend. The `""` key is the default.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vhosts: BTreeMap<String, BackendTarget>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        let mut vhosts = BTreeMap::new();
        vhosts.insert(DEFAULT_VHOST.to_string(), BackendTarget::Port(9100));

        Self {
            listen: ":9101".to_string(),
            required_client_name: String::new(),
            max_connections: 10_000,
            backend: None,
            tls: TlsConfig::default(),
            vhosts,
            timeouts: TimeoutConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl ProxyConfig {
    /// The configured identity constraint, if any.
    pub fn required_identity(&self) -> Option<&str> {
        let name = self.required_client_name.trim();
        (!name.is_empty()).then_some(name)
    }

    /// Normalize either routing shape into a host → backend table.
    ///
    /// A single `backend` becomes the default entry.
    pub fn routing_table(&self) -> BTreeMap<String, BackendTarget> {
        match &self.backend {
            Some(target) => {
                let mut table = BTreeMap::new();
                table.insert(DEFAULT_VHOST.to_string(), target.clone());
                table
            }
            None => self.vhosts.clone(),
        }
    }
}

/// TLS material locations (PEM files).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TlsConfig {
    /// CA bundle that client certificates must chain to.
    pub ca: String,

    /// Server certificate chain.
    pub cert: String,

    /// Server private key.
    pub key: String,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            ca: "ca.pem".to_string(),
            cert: "server.pem".to_string(),
            key: "server-key.pem".to_string(),
        }
    }
}

/// Where a virtual host is forwarded to.
///
/// A bare port is shorthand for `http://127.0.0.1:<port>`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum BackendTarget {
    Port(u16),
    Url(String),
}

impl BackendTarget {
    /// The base URL this target forwards to.
    pub fn to_url_string(&self) -> String {
        match self {
            BackendTarget::Port(port) => format!("http://127.0.0.1:{}", port),
            BackendTarget::Url(url) => url.clone(),
        }
    }
}

impl fmt::Display for BackendTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_url_string())
    }
}

/// Timeout configuration, all in seconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// TLS handshake deadline.
    pub handshake_secs: u64,

    /// Time allowed to receive the request headers.
    pub read_header_secs: u64,

    /// Time allowed to receive the full request body.
    pub read_secs: u64,

    /// Time allowed to produce and write the response.
    pub write_secs: u64,

    /// Backend connection establishment timeout.
    pub upstream_connect_secs: u64,

    /// Time to wait for the backend's response headers.
    pub upstream_response_header_secs: u64,

    /// How long an idle pooled backend connection is kept.
    pub upstream_idle_secs: u64,

    /// Drain window for in-flight connections during shutdown.
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            handshake_secs: 10,
            read_header_secs: 1,
            read_secs: 10,
            write_secs: 10,
            upstream_connect_secs: 30,
            upstream_response_header_secs: 10,
            upstream_idle_secs: 90,
            shutdown_grace_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
