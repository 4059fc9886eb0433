//! Configuration loading from disk.

use std::fs;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::cache::{CacheRule, CacheTable, CacheTableError};
use crate::config::schema::{CacheConfig, MonitorConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),

    #[error(transparent)]
    InvalidRule(#[from] CacheTableError),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<MonitorConfig, ConfigError> {
    let config: MonitorConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<MonitorConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Build a compiled cache table from its configuration.
pub fn cache_table(config: &CacheConfig) -> Result<CacheTable, ConfigError> {
    let rules = config
        .rules
        .iter()
        .map(|rule| {
            let ttl = Duration::from_secs(rule.ttl_secs);
            if rule.regex {
                CacheRule::regex(rule.path.clone(), ttl)
            } else {
                CacheRule::literal(rule.path.clone(), ttl)
            }
        })
        .collect();
    let table = CacheTable::new(rules, Duration::from_secs(config.default_ttl_secs));
    table.compile()?;
    Ok(table)
}
