//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a file.
///
/// Files ending in `.json` are parsed as JSON, everything else as TOML.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let config = if is_json {
        parse_json(&content)?
    } else {
        parse_toml(&content)?
    };

    tracing::debug!(path = %path.display(), "Configuration file parsed");
    Ok(config)
}

/// Parse and validate a TOML document.
pub fn parse_toml(content: &str) -> Result<ProxyConfig, ConfigError> {
    let config: ProxyConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Parse and validate a JSON document.
pub fn parse_json(content: &str) -> Result<ProxyConfig, ConfigError> {
    let config: ProxyConfig = serde_json::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{BackendTarget, DEFAULT_VHOST};
    use std::io::Write;

    #[test]
    fn loads_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
            listen = "127.0.0.1:8443"
            required_client_name = "client.example.com"

            [tls]
            ca = "/etc/proxy/ca.pem"
            cert = "/etc/proxy/server.pem"
            key = "/etc/proxy/server-key.pem"

            [vhosts]
            "a.example.com" = 9001
            "" = "http://127.0.0.1:9000"

            [timeouts]
            read_header_secs = 2
            "#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.listen, "127.0.0.1:8443");
        assert_eq!(config.required_identity(), Some("client.example.com"));
        assert_eq!(config.tls.ca, "/etc/proxy/ca.pem");
        assert_eq!(config.timeouts.read_header_secs, 2);
        assert_eq!(config.timeouts.write_secs, 10);
        assert_eq!(config.vhosts["a.example.com"], BackendTarget::Port(9001));
        assert!(config.vhosts.contains_key(DEFAULT_VHOST));
    }

    #[test]
    fn loads_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{
                "listen": ":9101",
                "required_client_name": "",
                "tls": {{ "ca": "ca.pem", "cert": "server.pem", "key": "server-key.pem" }},
                "vhosts": {{ "": 9100, "metrics.example.com": 9102 }}
            }}"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.required_identity(), None);
        assert_eq!(config.vhosts.len(), 2);
        assert_eq!(config.vhosts[""], BackendTarget::Port(9100));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/proxy.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn syntax_error_is_parse_error() {
        let err = parse_toml("listen = ").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));

        let err = parse_json("{ \"listen\": ").unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn semantic_error_is_validation_error() {
        let err = parse_toml("backend = 9000\n[vhosts]\n\"a\" = 9001\n").unwrap_err();
        match err {
            ConfigError::Validation(errors) => {
                assert_eq!(errors, vec![ValidationError::AmbiguousRouting]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn generated_default_round_trips() {
        let rendered = toml::to_string_pretty(&ProxyConfig::default()).unwrap();
        let parsed = parse_toml(&rendered).unwrap();
        assert_eq!(parsed.routing_table(), ProxyConfig::default().routing_table());
        assert_eq!(parsed.listen, ":9101");
    }
}
