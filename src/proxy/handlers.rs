//! HTTP request handlers.

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Response,
};

use super::headers::{empty_response, json_response};
use super::server::RouteState;
use super::upstream::UpstreamRequest;
use crate::error::Error;

/// Handle POST on a provider route: validate, authenticate, forward, relay.
pub async fn forward(
    State(state): State<RouteState>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, Error> {
    let provider = state.route.policy.kind;
    tracing::info!(provider = %provider, "Received forward request");

    let result = execute_forward(&state, &headers, body).await;

    match &result {
        Ok(response) => tracing::info!(
            provider = %provider,
            status = %response.status(),
            "Relayed upstream response"
        ),
        Err(e) => tracing::info!(
            provider = %provider,
            status = %e.status(),
            "Request finished with error"
        ),
    }

    result
}

/// The single linear pass behind [`forward`]. Every early return is a
/// terminal outcome; nothing is retried.
async fn execute_forward(
    state: &RouteState,
    headers: &HeaderMap,
    body: Body,
) -> Result<Response, Error> {
    let route = &state.route;
    let provider = route.policy.kind;

    let payload = parse_body(body, state.max_body_bytes).await?;

    let key = route.resolve_key(headers).ok_or_else(|| {
        tracing::warn!(provider = %provider, "No API key configured or supplied");
        Error::MissingCredential {
            provider: provider.to_string(),
        }
    })?;

    let outbound_headers = route.policy.outbound_headers(&key, headers)?;
    let request = UpstreamRequest {
        url: route.policy.upstream_url.clone(),
        headers: outbound_headers,
        body: Bytes::from(
            serde_json::to_vec(&payload).map_err(|e| Error::Internal(e.to_string()))?,
        ),
    };

    tracing::debug!(provider = %provider, url = %request.url, "Forwarding to upstream");

    let upstream_response = state.upstream.send(request).await.map_err(|e| {
        tracing::error!(provider = %provider, error = %e, "Failed to reach upstream");
        e
    })?;

    let status = upstream_response.status;
    if !status.is_success() {
        let error_body = String::from_utf8_lossy(&upstream_response.body).into_owned();
        tracing::warn!(
            provider = %provider,
            status = %status,
            body = %error_body,
            "Upstream returned error"
        );
        return Err(Error::Upstream {
            status,
            body: error_body,
        });
    }

    let data: serde_json::Value =
        serde_json::from_slice(&upstream_response.body).map_err(|e| {
            tracing::error!(provider = %provider, error = %e, "Failed to parse upstream response");
            Error::MalformedUpstream(e)
        })?;

    // Success is always reported as 200, whatever 2xx upstream used.
    Ok(json_response(StatusCode::OK, &data))
}

/// Read the whole body and parse it as JSON. A body that cannot be read
/// (including one over `limit`) is treated the same as malformed JSON.
async fn parse_body(body: Body, limit: usize) -> Result<serde_json::Value, Error> {
    let bytes = axum::body::to_bytes(body, limit).await.map_err(|e| {
        tracing::warn!(error = %e, limit, "Failed to read request body");
        Error::InvalidJson(e.to_string())
    })?;

    serde_json::from_slice(&bytes).map_err(|e| {
        tracing::warn!(error = %e, "Failed to parse JSON body");
        Error::InvalidJson(e.to_string())
    })
}

/// Handle OPTIONS on a provider route.
pub async fn preflight() -> Response {
    empty_response(StatusCode::NO_CONTENT)
}

/// Fallback for unknown paths.
pub async fn not_found() -> Response {
    json_response(
        StatusCode::NOT_FOUND,
        &serde_json::json!({ "error": "Not Found" }),
    )
}

/// Fallback for a provider route hit with a method it does not serve.
pub async fn method_not_allowed() -> Response {
    json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &serde_json::json!({ "error": "Method Not Allowed" }),
    )
}
