//! Code-intelligence janitor binary.

use anyhow::{Context, Result};
use clap::Parser;
use codeintel_core::config::AppConfig;
use codeintel_janitor::Janitor;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use time::OffsetDateTime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Background janitor for code-intelligence upload records
#[derive(Parser, Debug)]
#[command(name = "codeintel-janitor")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "CODEINTEL_CONFIG",
        default_value = "config/janitor.toml"
    )]
    config: String,

    /// Run a single pass, print its stats as JSON and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("codeintel-janitor v{}", env!("CARGO_PKG_VERSION"));

    // The config file is optional; env vars can provide or override everything.
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    if config_path.exists() {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}, using defaults", args.config);
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("CODEINTEL_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;

    let metadata = codeintel_metadata::from_config(&config.metadata, config.reference_counts)
        .await
        .context("failed to initialize metadata store")?;
    metadata
        .health_check()
        .await
        .context("metadata health check failed")?;
    tracing::info!("Metadata store initialized");

    let janitor = Janitor::new(metadata, config.janitor.clone());

    if args.once {
        let stats = janitor.run_once(OffsetDateTime::now_utc()).await;
        println!(
            "{}",
            serde_json::to_string_pretty(&stats).context("failed to serialize stats")?
        );
        if stats.errors > 0 {
            anyhow::bail!("janitor pass finished with {} errors", stats.errors);
        }
        return Ok(());
    }

    let mut ticker = tokio::time::interval(janitor.config().interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tracing::info!(
        interval_secs = janitor.config().interval_secs,
        "Janitor loop started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                janitor.run_once(OffsetDateTime::now_utc()).await;
            }
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for shutdown signal")?;
                tracing::info!("Shutdown signal received, stopping janitor");
                break;
            }
        }
    }

    Ok(())
}
