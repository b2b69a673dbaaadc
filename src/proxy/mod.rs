//! HTTP proxy server module.
//!
//! This module provides the per-provider forwarding routes that accept
//! client JSON, attach server-held credentials, and relay upstream replies.

mod handlers;
pub mod headers;
mod server;
pub mod upstream;

pub use server::{create_router, run_server, AppState, ProviderRoute, RouteState};
pub use upstream::{HttpUpstream, Upstream, UpstreamRequest, UpstreamResponse};
