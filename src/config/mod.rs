//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → MonitorConfig (validated, immutable)
//!     → server.rs builds one collector per upstream
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{cache_table, load_config, parse_config, ConfigError};
pub use schema::{
    BreakerConfig, CacheConfig, CacheRuleConfig, LogFormat, MonitorConfig, ObservabilityConfig,
    ScrapeConfig, UpstreamConfig, UpstreamKind,
};
pub use validation::{validate_config, ValidationError};
