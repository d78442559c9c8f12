//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent one backend a virtual host forwards to
//! - Pre-compute its authority for the `Host` rewrite
//! - Rewrite incoming request URIs onto the backend base URL

use axum::http::Uri;
use url::Url;

use crate::config::BackendTarget;

/// A backend server, parsed once from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    /// Base URL; its path prefixes every forwarded path.
    base_url: Url,
    /// `host[:port]` used for the forwarded `Host` header.
    authority: String,
}

impl Upstream {
    /// Parse a backend target into an upstream.
    pub fn from_target(target: &BackendTarget) -> Result<Self, url::ParseError> {
        Self::parse(&target.to_url_string())
    }

    pub fn parse(url: &str) -> Result<Self, url::ParseError> {
        let base_url = Url::parse(url)?;
        let host = base_url.host_str().ok_or(url::ParseError::EmptyHost)?;
        let authority = match base_url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        Ok(Self { base_url, authority })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Map an incoming request URI onto this backend.
    ///
    /// Paths are joined with exactly one slash; the backend's own query
    /// comes first when both carry one.
    pub fn rewrite_uri(&self, incoming: &Uri) -> Result<Uri, axum::http::uri::InvalidUri> {
        let path = join_path(self.base_url.path(), incoming.path());
        let query = match (self.base_url.query(), incoming.query()) {
            (Some(base), Some(req)) if !base.is_empty() && !req.is_empty() => {
                Some(format!("{}&{}", base, req))
            }
            (Some(base), _) if !base.is_empty() => Some(base.to_string()),
            (_, Some(req)) if !req.is_empty() => Some(req.to_string()),
            _ => None,
        };

        let mut uri = format!("{}://{}{}", self.base_url.scheme(), self.authority, path);
        if let Some(query) = query {
            uri.push('?');
            uri.push_str(&query);
        }
        uri.parse()
    }
}

impl std::fmt::Display for Upstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.base_url.as_str())
    }
}

fn join_path(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{}/{}", base, path),
        _ => format!("{}{}", base, path),
    }
}
