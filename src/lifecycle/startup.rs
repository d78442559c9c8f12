//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Build the identity verifier, TLS configuration and host router
//! - Start the optional metrics exporter
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal, before the listener is bound
//! - Subsystems initialize in order, not concurrently

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use metrics_exporter_prometheus::BuildError;
use rustls::pki_types::InvalidDnsNameError;
use thiserror::Error;

use crate::config::{load_config, ConfigError, ObservabilityConfig, ProxyConfig};
use crate::http::ProxyServer;
use crate::net::listener::ListenerError;
use crate::net::tls::{build_server_config, TlsError};
use crate::observability::metrics;
use crate::routing::{HostRouter, RouteError};
use crate::security::{ChainVerifier, IdentityConstraint, IdentityVerifier};

/// Anything that stops the proxy from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid required_client_name '{name}': {source}")]
    Identity {
        name: String,
        #[source]
        source: InvalidDnsNameError,
    },

    #[error("TLS setup failed: {0}")]
    Tls(#[from] TlsError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("Invalid metrics address '{0}'")]
    MetricsAddress(String),

    #[error("Failed to start metrics exporter: {0}")]
    Metrics(#[from] BuildError),
}

/// Load configuration from `path`, or use the defaults.
pub fn load(path: Option<&Path>) -> Result<ProxyConfig, StartupError> {
    match path {
        Some(path) => Ok(load_config(path)?),
        None => Ok(ProxyConfig::default()),
    }
}

/// Build the proxy with the identity verifier described by `config`.
pub fn prepare(config: &ProxyConfig) -> Result<ProxyServer, StartupError> {
    let constraint = IdentityConstraint::from_config(config).map_err(|source| StartupError::Identity {
        name: config.required_client_name.clone(),
        source,
    })?;

    if constraint.is_set() {
        tracing::info!(identity = %constraint, "Client identity constraint enabled");
    } else {
        tracing::info!("No client identity constraint; any trusted certificate is accepted");
    }

    prepare_with(config, Arc::new(IdentityVerifier::new(constraint)))
}

/// Build the proxy around an arbitrary chain verifier.
pub fn prepare_with(
    config: &ProxyConfig,
    verifier: Arc<dyn ChainVerifier>,
) -> Result<ProxyServer, StartupError> {
    let tls = build_server_config(&config.tls, verifier)?;
    let router = HostRouter::from_config(config)?;

    tracing::info!(
        vhosts = router.vhost_count(),
        default_backend = router.has_default(),
        max_connections = config.max_connections,
        "Proxy configured"
    );

    Ok(ProxyServer::new(config, tls, router))
}

/// Install the Prometheus exporter when enabled.
pub fn start_metrics(config: &ObservabilityConfig) -> Result<(), StartupError> {
    if !config.metrics_enabled {
        return Ok(());
    }
    let addr: SocketAddr = config
        .metrics_address
        .parse()
        .map_err(|_| StartupError::MetricsAddress(config.metrics_address.clone()))?;
    metrics::init_metrics(addr)?;
    Ok(())
}
