//! llm-relay - Credential-injecting pass-through proxy for LLM provider APIs
//!
//! This library provides the core functionality for the llm-relay server:
//! configuration, the per-provider header policy, and the forwarding routes.

pub mod config;
pub mod error;
pub mod provider;
pub mod proxy;

pub use config::Config;
pub use error::{Error, Result};
