//! Outbound call to the provider.
//!
//! The network hop is the only effectful step in a forward, so it sits behind
//! the [`Upstream`] trait. Production uses [`HttpUpstream`]; tests swap in
//! recording stand-ins.

use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use reqwest::Client;

use crate::error::Result;

/// A fully built outbound request.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Buffered upstream reply.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

/// Capability to POST a request to an upstream provider.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Send `request` and buffer the reply.
    ///
    /// Any failure to obtain a complete reply (DNS, connect, reset, timeout,
    /// body read) is an error; a reply with a non-success status is not.
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse>;
}

/// reqwest-backed upstream.
#[derive(Clone)]
pub struct HttpUpstream {
    client: Client,
}

impl HttpUpstream {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client with an optional overall timeout. With `None` the
    /// request runs until the peer or the runtime gives up.
    pub fn with_timeout(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self::new(builder.build()?))
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse> {
        let response = self
            .client
            .post(&request.url)
            .headers(request.headers)
            .body(request.body)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        tracing::debug!(
            url = %request.url,
            status = %status,
            bytes = body.len(),
            "Upstream responded"
        );

        Ok(UpstreamResponse { status, body })
    }
}
