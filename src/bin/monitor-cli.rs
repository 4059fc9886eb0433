use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::json;

use upstream_monitor::config::load_config;
use upstream_monitor::Monitor;

#[derive(Parser)]
#[command(name = "monitor-cli")]
#[command(about = "Management CLI for the upstream monitor", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:9090")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that a running monitor is up
    Status,
    /// Fetch the metrics of a running monitor
    Metrics {
        #[arg(short, long, default_value = "/metrics")]
        path: String,
    },
    /// Validate a configuration file and summarize it
    Check { config: PathBuf },
    /// Scrape every configured upstream once and print the metrics
    Scrape { config: PathBuf },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Status => {
            let res = client.get(format!("{}/health", cli.url)).send().await?;
            print_response(res).await?;
        }
        Commands::Metrics { path } => {
            let res = client.get(format!("{}{}", cli.url, path)).send().await?;
            print_response(res).await?;
        }
        Commands::Check { config } => {
            let config = load_config(&config)?;
            let upstreams: Vec<_> = config
                .upstreams
                .iter()
                .map(|u| {
                    json!({
                        "name": u.name,
                        "kind": u.kind,
                        "url": u.url,
                        "cache": if u.cache.is_some() { "custom" } else { "default" },
                    })
                })
                .collect();
            let summary = json!({
                "metrics": format!("{}{}", config.observability.metrics_address, config.observability.metrics_path),
                "namespace": config.observability.namespace,
                "upstreams": upstreams,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Scrape { config } => {
            let config = load_config(&config)?;
            let monitor = Monitor::build(&config)?;
            let succeeded = monitor.refresh_all().await;
            print!("{}", monitor.registry().render()?);
            eprintln!("{}/{} upstreams scraped", succeeded, monitor.collectors().len());
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: monitor returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }
    print!("{}", res.text().await?);
    Ok(())
}
