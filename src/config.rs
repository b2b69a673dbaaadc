//! Configuration parsing and validation for llm-relay.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, Serializer};
use std::path::Path;

use crate::provider::ProviderKind;

/// Root configuration structure.
///
/// Only built through [`Config::from_raw_with`] and its wrappers, so every
/// config has had its keys expanded and has been validated.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub providers: ProvidersConfig,
    pub logging: LoggingConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "127.0.0.1:3000")
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Largest request body accepted, in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Overall upstream timeout; unset means no timeout is imposed
    #[serde(default)]
    pub upstream_timeout_secs: Option<u64>,
}

fn default_listen() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_body_bytes: default_max_body_bytes(),
            upstream_timeout_secs: None,
        }
    }
}

/// API key wrapper that redacts in Debug/Display/Serialize and zeroizes on drop.
///
/// Only accessible via `.expose_secret()`, so every use is grep-auditable.
#[derive(Clone)]
pub struct ApiKey(SecretString);

impl ApiKey {
    /// Access the raw key value.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }

    /// True when the key is empty or whitespace; such a key counts as absent.
    pub fn is_blank(&self) -> bool {
        self.expose_secret().trim().is_empty()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Display for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl Serialize for ApiKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("[REDACTED]")
    }
}

impl From<String> for ApiKey {
    fn from(s: String) -> Self {
        ApiKey(SecretString::from(s))
    }
}

impl From<&str> for ApiKey {
    fn from(s: &str) -> Self {
        ApiKey(SecretString::from(s))
    }
}

/// How a provider's API key was resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum KeySource {
    /// Key was a literal string in config (no ${} references)
    Literal,
    /// Key contained ${VAR} references expanded from environment
    EnvExpanded,
    /// Key came from the provider's conventional env var (holds var name)
    Convention(String),
    /// No key available
    None,
}

impl std::fmt::Display for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySource::Literal => write!(f, "config-literal"),
            KeySource::EnvExpanded => write!(f, "env-expanded"),
            KeySource::Convention(var) => write!(f, "convention ({})", var),
            KeySource::None => write!(f, "none"),
        }
    }
}

/// Per-provider settings.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Server-held credential
    pub api_key: Option<ApiKey>,
    /// Let callers supply their own key in the provider's auth header
    pub allow_client_key: bool,
    /// Serve this provider's route at all
    pub enabled: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            allow_client_key: false,
            enabled: true,
        }
    }
}

/// Settings for every known provider.
#[derive(Debug, Clone, Default)]
pub struct ProvidersConfig {
    pub openai: ProviderConfig,
    pub anthropic: ProviderConfig,
}

impl ProvidersConfig {
    pub fn get(&self, kind: ProviderKind) -> &ProviderConfig {
        match kind {
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Anthropic => &self.anthropic,
        }
    }

    fn get_mut(&mut self, kind: ProviderKind) -> &mut ProviderConfig {
        match kind {
            ProviderKind::OpenAi => &mut self.openai,
            ProviderKind::Anthropic => &mut self.anthropic,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::Validation(
                "server.max_body_bytes must be greater than zero".to_string(),
            ));
        }

        if self.server.upstream_timeout_secs == Some(0) {
            return Err(ConfigError::Validation(
                "server.upstream_timeout_secs must be greater than zero when set".to_string(),
            ));
        }

        if ProviderKind::ALL
            .iter()
            .all(|kind| !self.providers.get(*kind).enabled)
        {
            tracing::warn!("All providers disabled - relay will only answer with 404");
        }

        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable '{var}' not set for provider '{provider}': {message}")]
    EnvVar {
        var: String,
        provider: String,
        message: String,
    },
}

/// Raw provider config deserialized directly from TOML.
/// api_key is `Option<String>` so it may contain `${VAR}` references not yet expanded.
#[derive(Debug, Default, Deserialize)]
pub struct RawProviderConfig {
    api_key: Option<String>,
    #[serde(default)]
    allow_client_key: bool,
    #[serde(default = "default_true")]
    enabled: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawProvidersConfig {
    openai: Option<RawProviderConfig>,
    anthropic: Option<RawProviderConfig>,
}

/// Raw configuration deserialized directly from TOML.
/// Provider api_key values may contain `${VAR}` references not yet expanded.
#[derive(Debug, Default, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    providers: RawProvidersConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

impl RawProvidersConfig {
    fn take(&mut self, kind: ProviderKind) -> RawProviderConfig {
        let slot = match kind {
            ProviderKind::OpenAi => &mut self.openai,
            ProviderKind::Anthropic => &mut self.anthropic,
        };
        slot.take().unwrap_or(RawProviderConfig {
            enabled: true,
            ..Default::default()
        })
    }
}

/// Expand all `${VAR}` references in a string using a custom lookup function.
///
/// The closure-based design makes this testable without touching global env state.
/// Supports multiple `${VAR}` in one string (e.g., `${PREFIX}-${SUFFIX}`).
/// Fails on first missing variable, unclosed `${`, or empty variable name.
fn expand_env_vars_with<F>(
    input: &str,
    provider_name: &str,
    lookup: &F,
) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if !input.contains("${") {
        return Ok(input.to_string());
    }

    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let end = after.find('}').ok_or_else(|| ConfigError::EnvVar {
            var: "<unclosed>".to_string(),
            provider: provider_name.to_string(),
            message: "Unclosed '${' in api_key value".to_string(),
        })?;

        let var_name = &after[..end];
        if var_name.is_empty() {
            return Err(ConfigError::EnvVar {
                var: "".to_string(),
                provider: provider_name.to_string(),
                message: "Empty variable name in '${}' reference".to_string(),
            });
        }

        let value = lookup(var_name).ok_or_else(|| ConfigError::EnvVar {
            var: var_name.to_string(),
            provider: provider_name.to_string(),
            message: format!(
                "Environment variable '{}' is not set (referenced in provider '{}')",
                var_name, provider_name
            ),
        })?;

        result.push_str(&value);
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    Ok(result)
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

impl Config {
    /// Convert raw (deserialized) config to final config with env var expansion.
    ///
    /// For each provider:
    /// - If `api_key` contains `${VAR}`: expand from environment, source = `EnvExpanded`
    /// - If `api_key` is a literal string: wrap directly, source = `Literal`
    /// - If `api_key` is absent: try the provider's conventional variable
    ///   (`OPENAI_API_KEY`, `ANTHROPIC_API_KEY`), source = `Convention(var)` or `None`
    pub fn from_raw(raw: RawConfig) -> Result<(Self, Vec<(ProviderKind, KeySource)>), ConfigError> {
        Self::from_raw_with(raw, &env_lookup)
    }

    /// [`from_raw`](Self::from_raw) with an injectable variable lookup.
    ///
    /// The resulting config is validated before it is returned.
    pub fn from_raw_with<F>(
        mut raw: RawConfig,
        lookup: &F,
    ) -> Result<(Self, Vec<(ProviderKind, KeySource)>), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut providers = ProvidersConfig::default();
        let mut key_sources = Vec::with_capacity(ProviderKind::ALL.len());

        for kind in ProviderKind::ALL {
            let rp = raw.providers.take(kind);
            let (api_key, source) = match rp.api_key {
                Some(ref raw_key) if raw_key.contains("${") => {
                    let expanded = expand_env_vars_with(raw_key, kind.name(), lookup)?;
                    (Some(ApiKey::from(expanded)), KeySource::EnvExpanded)
                }
                Some(ref raw_key) => (Some(ApiKey::from(raw_key.as_str())), KeySource::Literal),
                None => match lookup(kind.env_var()) {
                    Some(value) if !value.trim().is_empty() => (
                        Some(ApiKey::from(value)),
                        KeySource::Convention(kind.env_var().to_string()),
                    ),
                    _ => (None, KeySource::None),
                },
            };

            key_sources.push((kind, source));
            *providers.get_mut(kind) = ProviderConfig {
                api_key,
                allow_client_key: rp.allow_client_key,
                enabled: rp.enabled,
            };
        }

        let config = Config {
            server: raw.server,
            providers,
            logging: raw.logging,
        };
        config.validate()?;

        Ok((config, key_sources))
    }

    /// Parse TOML `content` and resolve keys through `lookup`.
    pub fn from_toml_with<F>(
        content: &str,
        lookup: &F,
    ) -> Result<(Self, Vec<(ProviderKind, KeySource)>), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw: RawConfig = toml::from_str(content)?;
        Self::from_raw_with(raw, lookup)
    }

    /// Build configuration with no file: defaults plus conventional env vars.
    pub fn from_env() -> Result<(Self, Vec<(ProviderKind, KeySource)>), ConfigError> {
        Self::from_raw(RawConfig::default())
    }

    /// Load configuration from a TOML file with environment variable expansion.
    ///
    /// This is the env-var-aware entry point. It:
    /// 1. Reads the file
    /// 2. Parses as `RawConfig` (api_key as plain String)
    /// 3. Expands `${VAR}` references and applies convention lookup
    /// 4. Validates the resulting config
    ///
    /// Returns the config and per-provider key source information.
    pub fn from_file_with_env(
        path: impl AsRef<Path>,
    ) -> Result<(Self, Vec<(ProviderKind, KeySource)>), ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::from_toml_with(&content, &env_lookup)
    }

    /// Load from `path` when given, otherwise from the environment alone.
    pub fn load(
        path: Option<&str>,
    ) -> Result<(Self, Vec<(ProviderKind, KeySource)>), ConfigError> {
        match path {
            Some(path) => Self::from_file_with_env(path),
            None => Self::from_env(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn parse(toml: &str) -> Result<Config, ConfigError> {
        Config::from_toml_with(toml, &no_env).map(|(config, _)| config)
    }

    #[test]
    fn test_parse_empty_config_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:3000");
        assert_eq!(config.server.max_body_bytes, 10 * 1024 * 1024);
        assert!(config.server.upstream_timeout_secs.is_none());
        assert!(config.providers.openai.enabled);
        assert!(!config.providers.openai.allow_client_key);
        assert!(config.providers.anthropic.api_key.is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [server]
            listen = "0.0.0.0:8080"
            max_body_bytes = 2048
            upstream_timeout_secs = 90

            [providers.openai]
            api_key = "sk-literal"
            allow_client_key = true

            [providers.anthropic]
            enabled = false

            [logging]
            level = "debug"
        "#;

        let config = parse(toml).unwrap();
        assert_eq!(config.server.listen, "0.0.0.0:8080");
        assert_eq!(config.server.max_body_bytes, 2048);
        assert_eq!(config.server.upstream_timeout_secs, Some(90));
        assert!(config.providers.openai.allow_client_key);
        assert_eq!(
            config.providers.openai.api_key.as_ref().unwrap().expose_secret(),
            "sk-literal"
        );
        assert!(!config.providers.anthropic.enabled);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_zero_body_limit_rejected() {
        let toml = r#"
            [server]
            max_body_bytes = 0
        "#;
        let err = parse(toml).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let toml = r#"
            [server]
            upstream_timeout_secs = 0
        "#;
        assert!(matches!(parse(toml), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_api_key_debug_redaction() {
        let key = ApiKey::from("sk-super-secret");
        let debug_output = format!("{:?}", key);
        assert_eq!(debug_output, "[REDACTED]");
        assert!(!debug_output.contains("super-secret"));
    }

    #[test]
    fn test_api_key_display_redaction() {
        let key = ApiKey::from("sk-super-secret");
        assert_eq!(format!("{}", key), "[REDACTED]");
    }

    #[test]
    fn test_api_key_serialize_redaction() {
        let key = ApiKey::from("real-secret-value");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"[REDACTED]\"");
    }

    #[test]
    fn test_api_key_blank() {
        assert!(ApiKey::from("").is_blank());
        assert!(ApiKey::from("   ").is_blank());
        assert!(!ApiKey::from("sk-1").is_blank());
    }

    #[test]
    fn test_provider_config_debug_redaction() {
        let config = ProviderConfig {
            api_key: Some(ApiKey::from("sk-ant-secret")),
            allow_client_key: false,
            enabled: true,
        };
        let debug_output = format!("{:?}", config);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("sk-ant-secret"));
    }

    // ── Expansion tests (using expand_env_vars_with, no global env state) ──

    #[test]
    fn test_expand_single_var() {
        let lookup = |name: &str| match name {
            "MY_KEY" => Some("sk-resolved".to_string()),
            _ => None,
        };
        let result = expand_env_vars_with("${MY_KEY}", "openai", &lookup).unwrap();
        assert_eq!(result, "sk-resolved");
    }

    #[test]
    fn test_expand_mixed_literal_and_var() {
        let lookup = |name: &str| match name {
            "KEY" => Some("resolved".to_string()),
            _ => None,
        };
        let result = expand_env_vars_with("prefix-${KEY}-suffix", "openai", &lookup).unwrap();
        assert_eq!(result, "prefix-resolved-suffix");
    }

    #[test]
    fn test_expand_no_vars_passthrough() {
        let lookup = |_: &str| -> Option<String> { panic!("should not be called") };
        let result = expand_env_vars_with("literal-value", "openai", &lookup).unwrap();
        assert_eq!(result, "literal-value");
    }

    #[test]
    fn test_expand_missing_var_fails() {
        let lookup = |_: &str| None;
        let err = expand_env_vars_with("${MISSING}", "anthropic", &lookup)
            .unwrap_err()
            .to_string();
        assert!(err.contains("MISSING"), "Error should name the variable");
        assert!(err.contains("anthropic"), "Error should name the provider");
    }

    #[test]
    fn test_expand_unclosed_brace_fails() {
        let lookup = |_: &str| -> Option<String> { panic!("should not be called") };
        let err = expand_env_vars_with("${UNCLOSED", "openai", &lookup)
            .unwrap_err()
            .to_string()
            .to_lowercase();
        assert!(err.contains("unclosed"));
    }

    #[test]
    fn test_expand_empty_var_name_fails() {
        let lookup = |_: &str| -> Option<String> { panic!("should not be called") };
        let err = expand_env_vars_with("${}", "openai", &lookup)
            .unwrap_err()
            .to_string()
            .to_lowercase();
        assert!(err.contains("empty"));
    }

    #[test]
    fn test_expand_dollar_without_brace_passthrough() {
        let lookup = |_: &str| -> Option<String> { panic!("should not be called") };
        let result = expand_env_vars_with("$NOT_A_VAR", "openai", &lookup).unwrap();
        assert_eq!(result, "$NOT_A_VAR");
    }

    // ── from_raw_with (injected lookup) ──

    fn parse_raw(toml: &str) -> RawConfig {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn test_from_raw_convention_keys() {
        let lookup = |name: &str| match name {
            "OPENAI_API_KEY" => Some("sk-openai".to_string()),
            "ANTHROPIC_API_KEY" => Some("sk-ant".to_string()),
            _ => None,
        };
        let (config, sources) = Config::from_raw_with(RawConfig::default(), &lookup).unwrap();

        assert_eq!(
            config.providers.openai.api_key.as_ref().unwrap().expose_secret(),
            "sk-openai"
        );
        assert_eq!(
            config.providers.anthropic.api_key.as_ref().unwrap().expose_secret(),
            "sk-ant"
        );
        assert_eq!(
            sources,
            vec![
                (
                    ProviderKind::OpenAi,
                    KeySource::Convention("OPENAI_API_KEY".to_string())
                ),
                (
                    ProviderKind::Anthropic,
                    KeySource::Convention("ANTHROPIC_API_KEY".to_string())
                ),
            ]
        );
    }

    #[test]
    fn test_from_raw_no_keys_is_not_an_error() {
        let lookup = |_: &str| None;
        let (config, sources) = Config::from_raw_with(RawConfig::default(), &lookup).unwrap();
        assert!(config.providers.openai.api_key.is_none());
        assert!(config.providers.anthropic.api_key.is_none());
        assert!(sources.iter().all(|(_, s)| *s == KeySource::None));
    }

    #[test]
    fn test_from_raw_empty_convention_var_counts_as_absent() {
        let lookup = |name: &str| match name {
            "OPENAI_API_KEY" => Some(String::new()),
            _ => None,
        };
        let (config, sources) = Config::from_raw_with(RawConfig::default(), &lookup).unwrap();
        assert!(config.providers.openai.api_key.is_none());
        assert_eq!(sources[0], (ProviderKind::OpenAi, KeySource::None));
    }

    #[test]
    fn test_from_raw_literal_and_expanded() {
        let raw = parse_raw(
            r#"
            [providers.openai]
            api_key = "sk-literal"

            [providers.anthropic]
            api_key = "${RELAY_TEST_ANT}"
            allow_client_key = true
            "#,
        );
        let lookup = |name: &str| match name {
            "RELAY_TEST_ANT" => Some("sk-ant-expanded".to_string()),
            _ => panic!("unexpected lookup of {}", name),
        };
        let (config, sources) = Config::from_raw_with(raw, &lookup).unwrap();

        assert_eq!(sources[0].1, KeySource::Literal);
        assert_eq!(sources[1].1, KeySource::EnvExpanded);
        assert_eq!(
            config.providers.anthropic.api_key.as_ref().unwrap().expose_secret(),
            "sk-ant-expanded"
        );
        assert!(config.providers.anthropic.allow_client_key);
        assert!(config.providers.anthropic.enabled);
    }

    #[test]
    fn test_from_raw_missing_reference_fails() {
        let raw = parse_raw(
            r#"
            [providers.openai]
            api_key = "${RELAY_TEST_NOT_SET}"
            "#,
        );
        let lookup = |_: &str| None;
        let err = Config::from_raw_with(raw, &lookup).unwrap_err().to_string();
        assert!(err.contains("RELAY_TEST_NOT_SET"));
        assert!(err.contains("openai"));
    }

    #[test]
    fn test_from_toml_applies_convention_and_validation() {
        let lookup = |name: &str| match name {
            "OPENAI_API_KEY" => Some("sk-from-env".to_string()),
            _ => None,
        };
        let (config, sources) = Config::from_toml_with(
            r#"
            [providers.openai]
            allow_client_key = true
            "#,
            &lookup,
        )
        .unwrap();
        assert_eq!(
            config.providers.openai.api_key.as_ref().unwrap().expose_secret(),
            "sk-from-env"
        );
        assert_eq!(
            sources[0].1,
            KeySource::Convention("OPENAI_API_KEY".to_string())
        );

        let err = Config::from_toml_with("[server]\nmax_body_bytes = 0", &lookup).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
