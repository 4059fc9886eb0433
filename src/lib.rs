//! Prometheus exporter for Sonarr, Radarr and Plex.

pub mod cache;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod scrape;
pub mod snapshot;
pub mod transport;
pub mod upstream;

pub use config::schema::MonitorConfig;
pub use http::MetricsServer;
pub use lifecycle::{Monitor, Shutdown};
