//! Request forwarding.
//!
//! # Responsibilities
//! - Dispatch each authenticated request to its virtual host's backend
//! - Rewrite URI and `Host`, strip hop-by-hop headers, add `X-Forwarded-*`
//! - Stream request and response bodies without buffering
//! - Map upstream failures to 502 / 504

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, uri::InvalidUri, HeaderMap, HeaderName, HeaderValue, Request, StatusCode, Version},
    response::Response,
};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;

use crate::config::TimeoutConfig;
use crate::http::request::{request_id, set_forwarded_headers, target_host};
use crate::http::response;
use crate::net::connection::ConnectionSession;
use crate::observability::metrics;
use crate::routing::{Dispatch, HostRouter, Upstream};

/// Headers that describe a single hop and are never forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Failure forwarding one request upstream.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("invalid upstream URI: {0}")]
    Uri(#[from] InvalidUri),

    #[error("invalid upstream header value: {0}")]
    Header(#[from] header::InvalidHeaderValue),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    #[error("upstream sent no response headers within {0:?}")]
    Timeout(Duration),
}

impl ForwardError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Application state injected into the forwarding handler.
#[derive(Clone)]
pub struct ProxyState {
    pub router: Arc<HostRouter>,
    pub client: Client<HttpConnector, Body>,
    /// Deadline for the backend's response headers.
    pub upstream_timeout: Duration,
}

impl ProxyState {
    pub fn new(router: HostRouter, timeouts: &TimeoutConfig) -> Self {
        Self {
            router: Arc::new(router),
            client: build_client(timeouts),
            upstream_timeout: Duration::from_secs(timeouts.upstream_response_header_secs),
        }
    }
}

/// Pooled HTTP/1.1 client used for every backend.
pub fn build_client(timeouts: &TimeoutConfig) -> Client<HttpConnector, Body> {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(Duration::from_secs(timeouts.upstream_connect_secs)));
    connector.set_keepalive(Some(Duration::from_secs(30)));
    connector.set_nodelay(true);

    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(timeouts.upstream_idle_secs))
        .pool_max_idle_per_host(100)
        .build(connector)
}

/// Main proxy handler.
/// Looks up the virtual host and forwards the request to its backend.
pub async fn forward(State(state): State<ProxyState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let request_id = request_id(&request);
    let method = request.method().to_string();
    let host = target_host(&request);
    let client = request
        .extensions()
        .get::<Arc<ConnectionSession>>()
        .map(|session| session.subject().to_string())
        .unwrap_or_else(|| "<unknown>".to_string());

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        host = %host,
        path = %request.uri().path(),
        client = %client,
        "Proxying request"
    );

    let upstream = match state.router.route(&host) {
        Dispatch::Backend(upstream) => upstream,
        Dispatch::Unroutable => {
            tracing::warn!(request_id = %request_id, host = %host, "No backend for host");
            metrics::record_request(&method, 404, "none", start_time);
            return response::no_route();
        }
    };
    let backend = upstream.to_string();

    match forward_to(&state, upstream, request, &host).await {
        Ok(response) => {
            metrics::record_request(&method, response.status().as_u16(), &backend, start_time);
            response
        }
        Err(e) => {
            tracing::error!(
                request_id = %request_id,
                host = %host,
                backend = %backend,
                error = %e,
                "Upstream error"
            );
            let status = e.status();
            metrics::record_request(&method, status.as_u16(), &backend, start_time);
            match status {
                StatusCode::GATEWAY_TIMEOUT => response::gateway_timeout(),
                _ => response::bad_gateway(),
            }
        }
    }
}

async fn forward_to(
    state: &ProxyState,
    upstream: &Upstream,
    request: Request<Body>,
    host: &str,
) -> Result<Response, ForwardError> {
    let client_ip = client_ip(&request);
    let upstream_request = build_upstream_request(request, upstream, client_ip, host)?;

    let response: hyper::Response<Incoming> =
        tokio::time::timeout(state.upstream_timeout, state.client.request(upstream_request))
            .await
            .map_err(|_| ForwardError::Timeout(state.upstream_timeout))??;

    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    Ok(Response::from_parts(parts, Body::new(body)))
}

fn client_ip(request: &Request<Body>) -> Option<IpAddr> {
    let extensions = request.extensions();
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .or_else(|| {
            extensions
                .get::<Arc<ConnectionSession>>()
                .and_then(|session| session.peer_addr())
                .map(|addr| addr.ip())
        })
}

/// Turn an incoming request into the request sent to `upstream`.
///
/// The body is moved, not buffered.
pub fn build_upstream_request(
    request: Request<Body>,
    upstream: &Upstream,
    client_ip: Option<IpAddr>,
    original_host: &str,
) -> Result<Request<Body>, ForwardError> {
    let (mut parts, body) = request.into_parts();

    parts.uri = upstream.rewrite_uri(&parts.uri)?;
    parts.version = Version::HTTP_11;
    strip_hop_by_hop(&mut parts.headers);
    set_forwarded_headers(&mut parts.headers, client_ip, original_host);
    parts
        .headers
        .insert(header::HOST, HeaderValue::from_str(upstream.authority())?);

    Ok(Request::from_parts(parts, body))
}

/// Remove hop-by-hop headers, including any named in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}
