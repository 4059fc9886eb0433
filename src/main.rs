//! Upstream monitor
//!
//! Polls Sonarr, Radarr and Plex and republishes their state as Prometheus
//! metrics.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌────────────────────────────────────────────────────────────┐
//!                    │                     UPSTREAM MONITOR                        │
//!                    │                                                             │
//!   GET /metrics     │  ┌─────────┐    ┌──────────────┐    ┌───────────────┐       │
//!   ─────────────────┼─▶│  http   │───▶│   Monitor    │───▶│  collector    │       │
//!                    │  │ server  │    │ (join_all)   │    │ + breaker     │       │
//!                    │  └─────────┘    └──────────────┘    └──────┬────────┘       │
//!                    │                                            │                │
//!                    │                                            ▼                │
//!                    │                                    ┌───────────────┐        │
//!                    │                                    │   scraper     │        │
//!                    │                                    │ task/category │        │
//!                    │                                    └──────┬────────┘        │
//!                    │                                           │                 │
//!                    │                                           ▼                 │
//!   text exposition  │  ┌──────────┐   ┌────────────┐   ┌──────────────┐          │
//!   ◀────────────────┼──│ registry │◀──│  gauges    │   │ instrument → │──────────┼──▶ Sonarr
//!                    │  └──────────┘   └────────────┘   │ auth → cache │          │    Radarr
//!                    │                                  │ → network    │          │    Plex
//!                    │                                  └──────────────┘          │
//!                    └────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use upstream_monitor::config::load_config;
use upstream_monitor::lifecycle::signals::spawn_signal_handler;
use upstream_monitor::observability::logging;
use upstream_monitor::{MetricsServer, Monitor, Shutdown};

/// Headroom on top of the scrape deadline for one exposition request.
const EXPOSITION_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(name = "upstream-monitor", version, about = "Prometheus exporter for Sonarr, Radarr and Plex")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Log at debug level regardless of the configured level.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    logging::init(&config.observability, cli.debug);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        upstreams = config.upstreams.len(),
        "upstream-monitor starting"
    );

    let monitor = Arc::new(Monitor::build(&config)?);

    let listener = TcpListener::bind(&config.observability.metrics_address).await?;
    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    let request_timeout = Duration::from_secs(config.scrape.timeout_secs) + EXPOSITION_GRACE;
    let server = MetricsServer::new(monitor.clone(), &config.observability.metrics_path, request_timeout);
    server.run(listener, shutdown.signalled()).await?;

    monitor.shutdown();
    tracing::info!("Shutdown complete");
    Ok(())
}
