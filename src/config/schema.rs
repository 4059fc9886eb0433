//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the monitor.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the monitor.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MonitorConfig {
    /// Logging and metrics exposition settings.
    pub observability: ObservabilityConfig,

    /// Scrape deadlines.
    pub scrape: ScrapeConfig,

    /// Polled upstream services.
    pub upstreams: Vec<UpstreamConfig>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Bind address of the exposition server (e.g., "0.0.0.0:9090").
    pub metrics_address: String,

    /// Path the metrics are served on.
    pub metrics_path: String,

    /// Prefix of every exported metric name.
    pub namespace: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_address: "0.0.0.0:9090".to_string(),
            metrics_path: "/metrics".to_string(),
            namespace: "mediamon".to_string(),
        }
    }
}

/// Scrape deadlines.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScrapeConfig {
    /// Deadline for collecting one category, in seconds.
    pub timeout_secs: u64,

    /// Deadline for one HTTP request, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            request_timeout_secs: 10,
        }
    }
}

/// Supported upstream applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamKind {
    Sonarr,
    Radarr,
    Plex,
    Prowlarr,
    Transmission,
    Openvpn,
}

impl UpstreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpstreamKind::Sonarr => "sonarr",
            UpstreamKind::Radarr => "radarr",
            UpstreamKind::Plex => "plex",
            UpstreamKind::Prowlarr => "prowlarr",
            UpstreamKind::Transmission => "transmission",
            UpstreamKind::Openvpn => "openvpn",
        }
    }
}

/// One polled upstream.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Unique name, exported as the `upstream` label.
    pub name: String,

    /// Application type.
    pub kind: UpstreamKind,

    /// Base URL (e.g., "http://sonarr:8989"). For OpenVPN, an endpoint
    /// answering `204 No Content` through the tunnel.
    pub url: String,

    /// API key for Sonarr, Radarr and Prowlarr.
    #[serde(default)]
    pub api_key: Option<String>,

    /// plex.tv account for Plex.
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Known Plex token, used until the server rejects it.
    #[serde(default)]
    pub token: Option<String>,

    /// Days ahead covered by the calendar.
    #[serde(default = "default_calendar_days")]
    pub calendar_days: u32,

    /// How long slow-changing data (Plex library sizes, Prowlarr indexer
    /// statistics, VPN connectivity) is reused, in seconds.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// OpenVPN client status file.
    #[serde(default)]
    pub status_file: Option<PathBuf>,

    #[serde(default)]
    pub breaker: BreakerConfig,

    /// Response cache. Absent means the application's default table.
    #[serde(default)]
    pub cache: Option<CacheConfig>,
}

fn default_calendar_days() -> u32 {
    1
}

fn default_refresh_interval_secs() -> u64 {
    900
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failed scrapes before opening.
    pub failure_threshold: u32,

    /// Consecutive successful scrapes in half-open before closing.
    pub success_threshold: u32,

    /// Time spent open before a trial scrape, in seconds.
    pub open_duration_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 2,
            success_threshold: 1,
            open_duration_secs: 300,
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL for rules without one, in seconds.
    pub default_ttl_secs: u64,

    /// Interval of the expired-entry sweep, in seconds. 0 disables it.
    pub cleanup_interval_secs: u64,

    /// Cacheable paths. Empty caches every path.
    pub rules: Vec<CacheRuleConfig>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 900,
            cleanup_interval_secs: 300,
            rules: Vec::new(),
        }
    }
}

/// One cacheable path.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheRuleConfig {
    /// Literal path, or a regex when `regex` is set.
    pub path: String,

    #[serde(default)]
    pub regex: bool,

    /// TTL in seconds. 0 uses the default.
    #[serde(default)]
    pub ttl_secs: u64,
}
