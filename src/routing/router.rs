//! Virtual-host lookup and dispatch.
//!
//! # Responsibilities
//! - Store the host → backend table built from configuration
//! - Look up the backend for a request's target host
//! - Fall back to the default entry, or answer with an explicit no-route
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(1) host lookup via HashMap
//! - Exact, case-sensitive host match; no wildcard or suffix matching
//! - Explicit `Unroutable` rather than a silent forward

use std::collections::HashMap;

use thiserror::Error;

use crate::config::{ProxyConfig, DEFAULT_VHOST};
use crate::routing::backend::Upstream;

/// Error building the router from configuration.
#[derive(Debug, Error)]
#[error("invalid backend '{target}' for vhost '{vhost}': {source}")]
pub struct RouteError {
    pub vhost: String,
    pub target: String,
    #[source]
    pub source: url::ParseError,
}

/// Where a request goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch<'a> {
    /// Forward to this backend.
    Backend(&'a Upstream),
    /// No vhost matched and no default is configured.
    Unroutable,
}

/// Host router compiled from the vhost table.
#[derive(Debug, Default)]
pub struct HostRouter {
    vhosts: HashMap<String, Upstream>,
    default: Option<Upstream>,
}

impl HostRouter {
    /// Build from `(vhost, upstream)` pairs. The `""` key is the default.
    pub fn new(routes: impl IntoIterator<Item = (String, Upstream)>) -> Self {
        let mut router = Self::default();
        for (vhost, upstream) in routes {
            if vhost == DEFAULT_VHOST {
                router.default = Some(upstream);
            } else {
                router.vhosts.insert(vhost, upstream);
            }
        }
        router
    }

    /// Build from either configured routing shape.
    pub fn from_config(config: &ProxyConfig) -> Result<Self, RouteError> {
        let mut routes = Vec::new();
        for (vhost, target) in config.routing_table() {
            let upstream = Upstream::from_target(&target).map_err(|source| RouteError {
                vhost: vhost.clone(),
                target: target.to_string(),
                source,
            })?;
            let label = if vhost == DEFAULT_VHOST { "<default>" } else { vhost.as_str() };
            tracing::info!(
                vhost = label,
                backend = %upstream,
                "Route registered"
            );
            routes.push((vhost, upstream));
        }

        let router = Self::new(routes);
        if !router.has_default() {
            tracing::warn!("No default backend configured; unknown hosts will be refused");
        }
        Ok(router)
    }

    /// Select the backend for `host`.
    pub fn route(&self, host: &str) -> Dispatch<'_> {
        match self.vhosts.get(host).or(self.default.as_ref()) {
            Some(upstream) => Dispatch::Backend(upstream),
            None => Dispatch::Unroutable,
        }
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// Number of named virtual hosts, excluding the default.
    pub fn vhost_count(&self) -> usize {
        self.vhosts.len()
    }
}
