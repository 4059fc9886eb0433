//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (gauges, counters, histograms in an explicit registry)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → GET /metrics (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - The registry is passed to constructors, never global
//! - Metrics are cheap (atomic updates)

pub mod logging;
pub mod metrics;

pub use metrics::{MetricsRegistry, UpstreamLabels};
