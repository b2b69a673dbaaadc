//! llm-relay - Credential-injecting pass-through proxy for LLM provider APIs
//!
//! Accepts JSON from browser or server clients, attaches the server-held
//! provider key, and relays the request to OpenAI or Anthropic.

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use llm_relay::config::{Config, KeySource};
use llm_relay::provider::ProviderKind;

#[derive(Parser)]
#[command(name = "llm-relay")]
#[command(about = "Credential-injecting pass-through proxy for OpenAI and Anthropic")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the proxy server
    Serve {
        /// Path to configuration file (environment only when omitted)
        #[arg(short, long)]
        config: Option<String>,

        /// Override listen address
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Validate configuration file
    Check {
        /// Path to configuration file (environment only when omitted)
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Show provider routes and where their keys come from
    Providers {
        /// Path to configuration file (environment only when omitted)
        #[arg(short, long)]
        config: Option<String>,
    },
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("llm_relay={},tower_http=info", level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn log_key_sources(key_sources: &[(ProviderKind, KeySource)]) {
    for (kind, source) in key_sources {
        tracing::info!(provider = %kind, key_source = %source, "Resolved API key source");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, listen } => {
            let (mut cfg, key_sources) = Config::load(config.as_deref())?;
            init_tracing(&cfg.logging.level);

            tracing::info!(config = ?config, "Loaded configuration");
            log_key_sources(&key_sources);

            if let Some(addr) = listen {
                tracing::info!(listen = %addr, "Override listen address");
                cfg.server.listen = addr;
            }

            llm_relay::proxy::run_server(cfg).await
        }

        Commands::Check { config } => {
            init_tracing("info");
            let (cfg, key_sources) = Config::load(config.as_deref())?;

            println!("Configuration OK");
            println!("  listen:         {}", cfg.server.listen);
            println!("  max body bytes: {}", cfg.server.max_body_bytes);
            match cfg.server.upstream_timeout_secs {
                Some(secs) => println!("  upstream timeout: {}s", secs),
                None => println!("  upstream timeout: none"),
            }
            for (kind, source) in &key_sources {
                if *source == KeySource::None && !cfg.providers.get(*kind).allow_client_key {
                    println!(
                        "  warning: {} has no key; set {} or providers.{}.api_key",
                        kind,
                        kind.env_var(),
                        kind
                    );
                }
            }
            Ok(())
        }

        Commands::Providers { config } => {
            init_tracing("warn");
            let (cfg, key_sources) = Config::load(config.as_deref())?;

            for (kind, source) in &key_sources {
                let provider = cfg.providers.get(*kind);
                println!("{}", kind);
                println!("  enabled:      {}", provider.enabled);
                println!("  route:        POST/OPTIONS {}", kind.route());
                println!("  upstream:     {}", kind.upstream_url());
                println!("  key source:   {}", source);
                println!("  client keys:  {}", provider.allow_client_key);
            }
            Ok(())
        }
    }
}
