//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check upstream identity (unique names, usable URLs, credentials)
//! - Validate value ranges (thresholds >= 1, durations within (0, 1 year])
//! - Compile cache rule patterns ahead of the first request
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: MonitorConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use regex::Regex;
use thiserror::Error;
use url::Url;

use crate::config::schema::{MonitorConfig, UpstreamConfig, UpstreamKind};
use crate::http::HEALTH_PATH;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Upper bound of every configured duration, in seconds (one year).
pub const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

/// A single semantic problem, located by its config path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Check `config`, collecting every error found.
pub fn validate_config(config: &MonitorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let obs = &config.observability;
    if !LOG_LEVELS.contains(&obs.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", obs.log_level),
        ));
    }
    if obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", obs.metrics_address),
        ));
    }
    if !obs.metrics_path.starts_with('/') {
        errors.push(ValidationError::new(
            "observability.metrics_path",
            "must start with '/'",
        ));
    } else if obs.metrics_path == HEALTH_PATH {
        errors.push(ValidationError::new(
            "observability.metrics_path",
            format!("'{HEALTH_PATH}' is reserved"),
        ));
    }

    check_duration("scrape.timeout_secs".to_string(), config.scrape.timeout_secs, &mut errors);
    check_duration(
        "scrape.request_timeout_secs".to_string(),
        config.scrape.request_timeout_secs,
        &mut errors,
    );

    let mut names = HashSet::new();
    for (i, upstream) in config.upstreams.iter().enumerate() {
        let prefix = format!("upstreams[{i}]");
        if upstream.name.trim().is_empty() {
            errors.push(ValidationError::new(format!("{prefix}.name"), "must not be empty"));
        } else if !names.insert(upstream.name.as_str()) {
            errors.push(ValidationError::new(
                format!("{prefix}.name"),
                format!("duplicate upstream '{}'", upstream.name),
            ));
        }
        validate_upstream(&prefix, upstream, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_upstream(prefix: &str, upstream: &UpstreamConfig, errors: &mut Vec<ValidationError>) {
    match Url::parse(&upstream.url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {}
        Ok(url) => errors.push(ValidationError::new(
            format!("{prefix}.url"),
            format!("unsupported URL '{url}', expected http(s)://host"),
        )),
        Err(e) => errors.push(ValidationError::new(
            format!("{prefix}.url"),
            format!("invalid URL '{}': {e}", upstream.url),
        )),
    }

    match upstream.kind {
        UpstreamKind::Sonarr | UpstreamKind::Radarr | UpstreamKind::Prowlarr => {
            if is_blank(&upstream.api_key) {
                errors.push(ValidationError::new(
                    format!("{prefix}.api_key"),
                    format!("required for {}", upstream.kind.as_str()),
                ));
            }
        }
        UpstreamKind::Plex => {
            if is_blank(&upstream.username) || is_blank(&upstream.password) {
                errors.push(ValidationError::new(
                    format!("{prefix}.username"),
                    "username and password are required for plex",
                ));
            }
        }
        UpstreamKind::Transmission | UpstreamKind::Openvpn => {
            if upstream.cache.is_some() {
                errors.push(ValidationError::new(
                    format!("{prefix}.cache"),
                    format!("not supported for {}", upstream.kind.as_str()),
                ));
            }
        }
    }
    if matches!(
        upstream.kind,
        UpstreamKind::Plex | UpstreamKind::Prowlarr | UpstreamKind::Openvpn
    ) {
        check_duration(
            format!("{prefix}.refresh_interval_secs"),
            upstream.refresh_interval_secs,
            errors,
        );
    }
    if upstream.status_file.is_some() && upstream.kind != UpstreamKind::Openvpn {
        errors.push(ValidationError::new(
            format!("{prefix}.status_file"),
            "only supported for openvpn",
        ));
    }

    let breaker = &upstream.breaker;
    if breaker.failure_threshold == 0 {
        errors.push(ValidationError::new(
            format!("{prefix}.breaker.failure_threshold"),
            "must be at least 1",
        ));
    }
    if breaker.success_threshold == 0 {
        errors.push(ValidationError::new(
            format!("{prefix}.breaker.success_threshold"),
            "must be at least 1",
        ));
    }
    check_duration(
        format!("{prefix}.breaker.open_duration_secs"),
        breaker.open_duration_secs,
        errors,
    );

    if let Some(cache) = &upstream.cache {
        check_duration(format!("{prefix}.cache.default_ttl_secs"), cache.default_ttl_secs, errors);
        if cache.cleanup_interval_secs > MAX_DURATION_SECS {
            errors.push(ValidationError::new(
                format!("{prefix}.cache.cleanup_interval_secs"),
                format!("must be at most {MAX_DURATION_SECS}"),
            ));
        }
        for (j, rule) in cache.rules.iter().enumerate() {
            if rule.ttl_secs > MAX_DURATION_SECS {
                errors.push(ValidationError::new(
                    format!("{prefix}.cache.rules[{j}].ttl_secs"),
                    format!("must be at most {MAX_DURATION_SECS}"),
                ));
            }
            if rule.regex {
                if let Err(e) = Regex::new(&rule.path) {
                    errors.push(ValidationError::new(
                        format!("{prefix}.cache.rules[{j}].path"),
                        format!("invalid regex: {e}"),
                    ));
                }
            } else if !rule.path.starts_with('/') {
                errors.push(ValidationError::new(
                    format!("{prefix}.cache.rules[{j}].path"),
                    "must start with '/'",
                ));
            }
        }
    }
}

/// Durations must be positive and at most [`MAX_DURATION_SECS`].
fn check_duration(field: String, secs: u64, errors: &mut Vec<ValidationError>) {
    if secs == 0 {
        errors.push(ValidationError::new(field, "must be greater than 0"));
    } else if secs > MAX_DURATION_SECS {
        errors.push(ValidationError::new(field, format!("must be at most {MAX_DURATION_SECS}")));
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{BreakerConfig, CacheConfig, CacheRuleConfig};

    fn sonarr(name: &str) -> UpstreamConfig {
        UpstreamConfig {
            name: name.to_string(),
            kind: UpstreamKind::Sonarr,
            url: "http://sonarr:8989".to_string(),
            api_key: Some("key".to_string()),
            username: None,
            password: None,
            token: None,
            calendar_days: 1,
            refresh_interval_secs: 900,
            status_file: None,
            breaker: BreakerConfig::default(),
            cache: None,
        }
    }

    fn fields(config: &MonitorConfig) -> Vec<String> {
        validate_config(config)
            .unwrap_err()
            .into_iter()
            .map(|e| e.field)
            .collect()
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&MonitorConfig::default()).is_ok());
    }

    #[test]
    fn test_valid_upstream() {
        let config = MonitorConfig {
            upstreams: vec![sonarr("tv")],
            ..Default::default()
        };
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_duplicate_names_and_bad_url() {
        let mut second = sonarr("tv");
        second.url = "ftp://sonarr".to_string();
        let config = MonitorConfig {
            upstreams: vec![sonarr("tv"), second],
            ..Default::default()
        };
        assert_eq!(fields(&config), vec!["upstreams[1].name", "upstreams[1].url"]);
    }

    #[test]
    fn test_missing_credentials() {
        let mut arr = sonarr("tv");
        arr.api_key = Some("  ".to_string());
        let mut plex = sonarr("plex");
        plex.kind = UpstreamKind::Plex;
        plex.api_key = None;
        plex.username = Some("user".to_string());

        let config = MonitorConfig {
            upstreams: vec![arr, plex],
            ..Default::default()
        };
        assert_eq!(fields(&config), vec!["upstreams[0].api_key", "upstreams[1].username"]);
    }

    #[test]
    fn test_collects_all_errors() {
        let mut upstream = sonarr("tv");
        upstream.breaker.failure_threshold = 0;
        upstream.breaker.open_duration_secs = 0;
        upstream.cache = Some(CacheConfig {
            rules: vec![CacheRuleConfig {
                path: "(".to_string(),
                regex: true,
                ttl_secs: 0,
            }],
            ..Default::default()
        });

        let mut config = MonitorConfig {
            upstreams: vec![upstream],
            ..Default::default()
        };
        config.observability.log_level = "loud".to_string();
        config.observability.metrics_address = "nowhere".to_string();
        config.observability.metrics_path = "metrics".to_string();
        config.scrape.timeout_secs = 0;

        assert_eq!(
            fields(&config),
            vec![
                "observability.log_level",
                "observability.metrics_address",
                "observability.metrics_path",
                "scrape.timeout_secs",
                "upstreams[0].breaker.failure_threshold",
                "upstreams[0].breaker.open_duration_secs",
                "upstreams[0].cache.rules[0].path",
            ]
        );
    }

    #[test]
    fn test_durations_are_bounded() {
        let mut upstream = sonarr("tv");
        upstream.breaker.open_duration_secs = u64::MAX;
        upstream.cache = Some(CacheConfig {
            default_ttl_secs: MAX_DURATION_SECS + 1,
            cleanup_interval_secs: u64::MAX,
            rules: vec![CacheRuleConfig {
                path: "/api/v3/series".to_string(),
                regex: false,
                ttl_secs: u64::MAX,
            }],
        });
        let config = MonitorConfig {
            upstreams: vec![upstream],
            ..Default::default()
        };

        assert_eq!(
            fields(&config),
            vec![
                "upstreams[0].breaker.open_duration_secs",
                "upstreams[0].cache.default_ttl_secs",
                "upstreams[0].cache.cleanup_interval_secs",
                "upstreams[0].cache.rules[0].ttl_secs",
            ]
        );
    }

    #[test]
    fn test_new_kinds() {
        let mut prowlarr = sonarr("indexers");
        prowlarr.kind = UpstreamKind::Prowlarr;
        prowlarr.api_key = None;

        let mut transmission = sonarr("torrents");
        transmission.kind = UpstreamKind::Transmission;
        transmission.api_key = None;
        transmission.cache = Some(CacheConfig::default());

        let mut vpn = sonarr("vpn");
        vpn.kind = UpstreamKind::Openvpn;
        vpn.api_key = None;
        vpn.status_file = Some("/var/run/openvpn.status".into());
        vpn.refresh_interval_secs = 0;

        let mut tv = sonarr("tv");
        tv.status_file = Some("/tmp/status".into());

        let config = MonitorConfig {
            upstreams: vec![prowlarr, transmission, vpn, tv],
            ..Default::default()
        };
        assert_eq!(
            fields(&config),
            vec![
                "upstreams[0].api_key",
                "upstreams[1].cache",
                "upstreams[2].refresh_interval_secs",
                "upstreams[3].status_file",
            ]
        );
    }
}
