//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Exactly one routing shape (single backend or vhost table)
//! - Validate backend targets, timeouts, identity constraint
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use rustls::pki_types::ServerName;
use thiserror::Error;
use url::Url;

use crate::config::schema::{BackendTarget, ProxyConfig};
use crate::net::listener::parse_listen_address;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid listen address '{0}'")]
    ListenAddress(String),

    #[error("both `backend` and `vhosts` are set; configure exactly one routing shape")]
    AmbiguousRouting,

    #[error("no routing configured; set `backend` or `vhosts`")]
    NoRouting,

    #[error("backend for vhost '{vhost}' is invalid: {reason}")]
    Backend { vhost: String, reason: String },

    #[error("tls.{0} must not be empty")]
    TlsPath(&'static str),

    #[error("required_client_name '{0}' is not a valid DNS name or IP address")]
    Identity(String),

    #[error("timeouts.{0} must be greater than zero")]
    Timeout(&'static str),

    #[error("max_connections must be greater than zero")]
    MaxConnections,

    #[error("unknown log_format '{0}' (expected \"pretty\" or \"json\")")]
    LogFormat(String),
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if parse_listen_address(&config.listen).is_err() {
        errors.push(ValidationError::ListenAddress(config.listen.clone()));
    }

    match (&config.backend, config.vhosts.is_empty()) {
        (Some(_), false) => errors.push(ValidationError::AmbiguousRouting),
        (None, true) => errors.push(ValidationError::NoRouting),
        _ => {}
    }

    for (vhost, target) in config.routing_table() {
        if let Err(reason) = check_backend(&target) {
            errors.push(ValidationError::Backend { vhost, reason });
        }
    }

    for (field, value) in [
        ("ca", &config.tls.ca),
        ("cert", &config.tls.cert),
        ("key", &config.tls.key),
    ] {
        if value.trim().is_empty() {
            errors.push(ValidationError::TlsPath(field));
        }
    }

    if let Some(identity) = config.required_identity() {
        if ServerName::try_from(identity.to_string()).is_err() {
            errors.push(ValidationError::Identity(identity.to_string()));
        }
    }

    let t = &config.timeouts;
    for (field, secs) in [
        ("handshake_secs", t.handshake_secs),
        ("read_header_secs", t.read_header_secs),
        ("read_secs", t.read_secs),
        ("write_secs", t.write_secs),
        ("upstream_connect_secs", t.upstream_connect_secs),
        ("upstream_response_header_secs", t.upstream_response_header_secs),
    ] {
        if secs == 0 {
            errors.push(ValidationError::Timeout(field));
        }
    }

    if config.max_connections == 0 {
        errors.push(ValidationError::MaxConnections);
    }

    match config.observability.log_format.as_str() {
        "pretty" | "json" => {}
        other => errors.push(ValidationError::LogFormat(other.to_string())),
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_backend(target: &BackendTarget) -> Result<(), String> {
    if let BackendTarget::Port(0) = target {
        return Err("port 0 is not a valid backend port".to_string());
    }

    let url = Url::parse(&target.to_url_string()).map_err(|e| e.to_string())?;
    if url.scheme() != "http" {
        return Err(format!("unsupported scheme '{}'", url.scheme()));
    }
    if url.host_str().is_none() {
        return Err("missing host".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&ProxyConfig::default()), Ok(()));
    }

    #[test]
    fn both_routing_shapes_rejected() {
        let mut config = ProxyConfig::default();
        config.backend = Some(BackendTarget::Port(9000));

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::AmbiguousRouting));
    }

    #[test]
    fn missing_routing_rejected() {
        let mut config = ProxyConfig::default();
        config.vhosts.clear();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::NoRouting]);
    }

    #[test]
    fn collects_every_error() {
        let mut config = ProxyConfig::default();
        config.listen = "not an address".into();
        config.tls.key = String::new();
        config.timeouts.read_secs = 0;
        config.observability.log_format = "xml".into();
        config
            .vhosts
            .insert("tls.example.com".into(), BackendTarget::Url("https://x:1".into()));

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(errors.contains(&ValidationError::TlsPath("key")));
        assert!(errors.contains(&ValidationError::Timeout("read_secs")));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::Backend { vhost, .. } if vhost == "tls.example.com")));
    }

    #[test]
    fn identity_must_be_a_server_name() {
        let mut config = ProxyConfig::default();
        config.required_client_name = "client.example.com".into();
        assert!(validate_config(&config).is_ok());

        config.required_client_name = "not a name!".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::Identity("not a name!".into())]
        );
    }

    #[test]
    fn backend_port_zero_rejected() {
        let mut config = ProxyConfig::default();
        config.vhosts.insert("a.example.com".into(), BackendTarget::Port(0));

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
    }
}
