//! Standard response header set.
//!
//! Every response the relay emits, on every path, carries the same
//! content-type and permissive CORS headers.

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const ALLOW_ORIGIN: &str = "*";
pub const ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
pub const ALLOW_HEADERS: &str = "*";

/// The four standard headers with their literal values.
pub fn standard_headers() -> [(HeaderName, HeaderValue); 4] {
    [
        (
            header::CONTENT_TYPE,
            HeaderValue::from_static(CONTENT_TYPE_JSON),
        ),
        (
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static(ALLOW_ORIGIN),
        ),
        (
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOW_METHODS),
        ),
        (
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOW_HEADERS),
        ),
    ]
}

/// Insert (or overwrite) the standard headers.
pub fn apply_standard_headers(headers: &mut HeaderMap) {
    for (name, value) in standard_headers() {
        headers.insert(name, value);
    }
}

/// Response mapper installed on the router so framework-generated responses
/// (404, 405) match handler responses.
pub async fn stamp_standard_headers(mut response: Response) -> Response {
    apply_standard_headers(response.headers_mut());
    response
}

/// JSON response with the standard headers.
pub fn json_response(status: StatusCode, body: &serde_json::Value) -> Response {
    // Value serialization cannot fail: keys are always strings.
    let bytes = serde_json::to_vec(body).unwrap_or_default();
    build(status, Body::from(bytes))
}

/// Empty-bodied response with the standard headers.
pub fn empty_response(status: StatusCode) -> Response {
    build(status, Body::empty())
}

fn build(status: StatusCode, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    apply_standard_headers(response.headers_mut());
    response
}
