//! HTTP server setup and configuration.

use axum::{
    body::Body,
    http::{HeaderMap, Request},
    middleware,
    routing::post,
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::handlers;
use super::headers::stamp_standard_headers;
use super::upstream::{HttpUpstream, Upstream};
use crate::config::{ApiKey, Config, ProviderConfig};
use crate::provider::{ProviderKind, ProviderPolicy};

/// A provider route: its header policy plus the credentials it may use.
#[derive(Debug, Clone)]
pub struct ProviderRoute {
    pub policy: ProviderPolicy,
    pub api_key: Option<ApiKey>,
    pub allow_client_key: bool,
}

impl ProviderRoute {
    pub fn new(policy: ProviderPolicy, api_key: Option<ApiKey>, allow_client_key: bool) -> Self {
        Self {
            policy,
            api_key,
            allow_client_key,
        }
    }

    pub fn from_config(kind: ProviderKind, config: &ProviderConfig) -> Self {
        Self::new(
            ProviderPolicy::for_kind(kind),
            config.api_key.clone(),
            config.allow_client_key,
        )
    }

    /// Pick the credential for one request.
    ///
    /// A caller-supplied key wins when client keys are allowed; otherwise the
    /// configured key is used. Blank keys never resolve.
    pub fn resolve_key(&self, inbound: &HeaderMap) -> Option<String> {
        if self.allow_client_key {
            if let Some(key) = self.policy.client_key(inbound) {
                return Some(key);
            }
        }

        self.api_key
            .as_ref()
            .filter(|key| !key.is_blank())
            .map(|key| key.expose_secret().to_string())
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub routes: Vec<ProviderRoute>,
    pub upstream: Arc<dyn Upstream>,
    pub max_body_bytes: usize,
}

impl AppState {
    /// Routes for every enabled provider in `config`.
    pub fn from_config(config: &Config, upstream: Arc<dyn Upstream>) -> Self {
        let routes = ProviderKind::ALL
            .into_iter()
            .filter(|kind| config.providers.get(*kind).enabled)
            .map(|kind| ProviderRoute::from_config(kind, config.providers.get(kind)))
            .collect();

        Self {
            routes,
            upstream,
            max_body_bytes: config.server.max_body_bytes,
        }
    }
}

/// Per-route handler state.
#[derive(Clone)]
pub struct RouteState {
    pub route: Arc<ProviderRoute>,
    pub upstream: Arc<dyn Upstream>,
    pub max_body_bytes: usize,
}

/// Create the axum router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    let mut app = Router::new();

    for route in state.routes {
        let path = route.policy.kind.route();
        let route_state = RouteState {
            route: Arc::new(route),
            upstream: state.upstream.clone(),
            max_body_bytes: state.max_body_bytes,
        };
        app = app.merge(
            Router::new()
                .route(
                    path,
                    post(handlers::forward)
                        .options(handlers::preflight)
                        .fallback(handlers::method_not_allowed),
                )
                .with_state(route_state),
        );
    }

    app.fallback(handlers::not_found).layer(
        ServiceBuilder::new()
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                    tracing::info_span!(
                        "request",
                        id = %Uuid::new_v4(),
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                }),
            )
            .layer(middleware::map_response(stamp_standard_headers)),
    )
}

/// Run the HTTP server.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let listen_addr = config.server.listen.clone();

    let upstream = HttpUpstream::with_timeout(
        config.server.upstream_timeout_secs.map(Duration::from_secs),
    )?;

    let state = AppState::from_config(&config, Arc::new(upstream));
    for route in &state.routes {
        tracing::info!(
            provider = %route.policy.kind,
            path = route.policy.kind.route(),
            upstream = %route.policy.upstream_url,
            client_keys = route.allow_client_key,
            "Registered provider route"
        );
        if route.api_key.is_none() && !route.allow_client_key {
            tracing::warn!(
                provider = %route.policy.kind,
                env_var = route.policy.kind.env_var(),
                "No API key configured - requests will be rejected with 401"
            );
        }
    }

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(address = %listen_addr, "Starting llm-relay server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
