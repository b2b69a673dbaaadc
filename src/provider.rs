//! Per-provider header policy.
//!
//! The only thing that differs between the forwarding routes is how the
//! credential is presented upstream and which extra headers the provider
//! requires. That difference lives here as data, so the handler stays generic
//! and a new provider is added by extending [`ProviderKind`].

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// OpenAI chat-completions endpoint.
pub const OPENAI_UPSTREAM_URL: &str = "https://api.openai.com/v1/chat/completions";
/// Anthropic messages endpoint.
pub const ANTHROPIC_UPSTREAM_URL: &str = "https://api.anthropic.com/v1/messages";

/// Header carrying the Anthropic API version.
pub const ANTHROPIC_VERSION_HEADER: &str = "anthropic-version";
/// Version sent when the caller does not negotiate one.
pub const DEFAULT_ANTHROPIC_VERSION: &str = "2023-06-01";
/// Header Anthropic expects the key in.
pub const ANTHROPIC_API_KEY_HEADER: &str = "x-api-key";

/// Upstream providers the relay knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
}

impl ProviderKind {
    /// Every supported provider, in route registration order.
    pub const ALL: [ProviderKind; 2] = [ProviderKind::OpenAi, ProviderKind::Anthropic];

    /// Short lowercase name used in config and logs.
    pub fn name(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
        }
    }

    /// Conventional environment variable holding the server-side key.
    pub fn env_var(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    /// Local path the relay serves this provider on.
    pub fn route(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "/llm/openai/chat/completions",
            ProviderKind::Anthropic => "/proxy/anthropic/v1/messages",
        }
    }

    /// Fixed upstream endpoint.
    pub fn upstream_url(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => OPENAI_UPSTREAM_URL,
            ProviderKind::Anthropic => ANTHROPIC_UPSTREAM_URL,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How the credential is written on the outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthScheme {
    /// `authorization: Bearer <key>`
    Bearer,
    /// `<header>: <key>`
    ApiKeyHeader(HeaderName),
}

/// A header the caller may set; the relay fills in `default` otherwise.
#[derive(Debug, Clone)]
pub struct NegotiatedHeader {
    pub name: HeaderName,
    pub default: HeaderValue,
}

/// Tagged header policy for a single provider.
#[derive(Debug, Clone)]
pub struct ProviderPolicy {
    pub kind: ProviderKind,
    pub upstream_url: String,
    pub auth: AuthScheme,
    /// Inbound header a caller uses to bring their own key.
    pub client_key_header: HeaderName,
    pub negotiated: Vec<NegotiatedHeader>,
}

impl ProviderPolicy {
    /// The fixed policy for `kind`.
    pub fn for_kind(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::OpenAi => Self {
                kind,
                upstream_url: kind.upstream_url().to_string(),
                auth: AuthScheme::Bearer,
                client_key_header: header::AUTHORIZATION,
                negotiated: Vec::new(),
            },
            ProviderKind::Anthropic => Self {
                kind,
                upstream_url: kind.upstream_url().to_string(),
                auth: AuthScheme::ApiKeyHeader(HeaderName::from_static(ANTHROPIC_API_KEY_HEADER)),
                client_key_header: HeaderName::from_static(ANTHROPIC_API_KEY_HEADER),
                negotiated: vec![NegotiatedHeader {
                    name: HeaderName::from_static(ANTHROPIC_VERSION_HEADER),
                    default: HeaderValue::from_static(DEFAULT_ANTHROPIC_VERSION),
                }],
            },
        }
    }

    /// Point the policy at a different endpoint. Only reachable from code,
    /// never from configuration.
    pub fn with_upstream_url(mut self, url: impl Into<String>) -> Self {
        self.upstream_url = url.into();
        self
    }

    /// Build the outbound header set for a request authenticated with `key`.
    pub fn outbound_headers(&self, key: &str, inbound: &HeaderMap) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        let (name, value) = match &self.auth {
            AuthScheme::Bearer => (header::AUTHORIZATION, format!("Bearer {}", key)),
            AuthScheme::ApiKeyHeader(name) => (name.clone(), key.to_string()),
        };
        let mut value = HeaderValue::from_str(&value).map_err(|_| {
            Error::Internal(format!(
                "credential for '{}' is not a valid header value",
                self.kind
            ))
        })?;
        value.set_sensitive(true);
        headers.insert(name, value);

        for negotiated in &self.negotiated {
            let value = inbound
                .get(&negotiated.name)
                .filter(|v| !v.is_empty())
                .cloned()
                .unwrap_or_else(|| negotiated.default.clone());
            headers.insert(negotiated.name.clone(), value);
        }

        Ok(headers)
    }

    /// Key supplied by the caller, if any.
    ///
    /// A `Bearer` scheme prefix on the OpenAI header is stripped so the value
    /// can be re-wrapped by [`outbound_headers`](Self::outbound_headers).
    pub fn client_key(&self, inbound: &HeaderMap) -> Option<String> {
        let raw = inbound.get(&self.client_key_header)?.to_str().ok()?.trim();
        let key = match self.auth {
            AuthScheme::Bearer => strip_bearer(raw),
            AuthScheme::ApiKeyHeader(_) => raw,
        };
        if key.is_empty() {
            None
        } else {
            Some(key.to_string())
        }
    }
}

/// Drop a leading `Bearer` scheme word. A scheme with no token yields "".
fn strip_bearer(value: &str) -> &str {
    let value = value.trim();
    let (scheme, rest) = value
        .split_once(char::is_whitespace)
        .unwrap_or((value, ""));
    if scheme.eq_ignore_ascii_case("bearer") {
        rest.trim()
    } else {
        value
    }
}
