//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate unique request IDs (UUID v4)
//! - Extract the target host used for virtual-host routing
//! - Add the `X-Forwarded-*` headers of a reverse proxy

use std::net::IpAddr;

use axum::http::{header, HeaderMap, HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

pub const X_REQUEST_ID: &str = "x-request-id";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_FORWARDED_HOST: &str = "x-forwarded-host";
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Request ID generator backed by UUID v4.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// The request ID set by the request-id layer, or "unknown".
pub fn request_id<B>(request: &Request<B>) -> String {
    request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// The host a request targets: the `Host` header, else the URI authority
/// (HTTP/2 `:authority`), else empty.
pub fn target_host<B>(request: &Request<B>) -> String {
    request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .or_else(|| request.uri().authority().map(|a| a.as_str().to_owned()))
        .unwrap_or_default()
}

/// Append the client to `X-Forwarded-For` and record the original host and
/// scheme.
pub fn set_forwarded_headers(headers: &mut HeaderMap, client_ip: Option<IpAddr>, original_host: &str) {
    if let Some(ip) = client_ip {
        let prior: Vec<&str> = headers
            .get_all(X_FORWARDED_FOR)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        let value = if prior.is_empty() {
            ip.to_string()
        } else {
            format!("{}, {}", prior.join(", "), ip)
        };
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }

    if !original_host.is_empty() {
        if let Ok(value) = HeaderValue::from_str(original_host) {
            headers.insert(X_FORWARDED_HOST, value);
        }
    }
    headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("https"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn host_header_preferred() {
        let req = Request::builder()
            .uri("https://authority.example.com/x")
            .header("Host", "a.example.com")
            .body(Body::empty())
            .unwrap();
        assert_eq!(target_host(&req), "a.example.com");
    }

    #[test]
    fn authority_used_without_host_header() {
        let req = Request::builder()
            .uri("https://b.example.com:8443/x")
            .body(Body::empty())
            .unwrap();
        assert_eq!(target_host(&req), "b.example.com:8443");

        let bare = Request::builder().uri("/x").body(Body::empty()).unwrap();
        assert_eq!(target_host(&bare), "");
    }

    #[test]
    fn forwarded_for_is_appended() {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("203.0.113.7"));

        set_forwarded_headers(&mut headers, Some("10.0.0.9".parse().unwrap()), "a.example.com");

        assert_eq!(headers[X_FORWARDED_FOR], "203.0.113.7, 10.0.0.9");
        assert_eq!(headers[X_FORWARDED_HOST], "a.example.com");
        assert_eq!(headers[X_FORWARDED_PROTO], "https");
    }

    #[test]
    fn generated_ids_are_unique() {
        let req = Request::builder().body(Body::empty()).unwrap();
        let mut maker = UuidRequestId;
        let a = maker.make_request_id(&req).unwrap();
        let b = maker.make_request_id(&req).unwrap();
        assert_ne!(a.header_value(), b.header_value());
    }
}
