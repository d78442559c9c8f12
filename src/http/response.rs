//! Error responses returned by the proxy itself.
//!
//! Handshake failures never get here; only authenticated requests that could
//! not be routed or forwarded.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// No vhost matched and no default backend is configured.
pub fn no_route() -> Response {
    (StatusCode::NOT_FOUND, "no backend configured for host").into_response()
}

/// The backend could not be reached or answered badly.
pub fn bad_gateway() -> Response {
    (StatusCode::BAD_GATEWAY, "upstream request failed").into_response()
}

/// The backend did not answer in time.
pub fn gateway_timeout() -> Response {
    (StatusCode::GATEWAY_TIMEOUT, "upstream timed out").into_response()
}

/// The client did not send its request body in time.
pub fn request_timeout() -> Response {
    (StatusCode::REQUEST_TIMEOUT, "request body timed out").into_response()
}
