//! HTTP exposition subsystem.
//!
//! # Data Flow
//! ```text
//! GET /metrics
//!     → server.rs (Axum handler)
//!     → Monitor::gather (refresh every upstream concurrently)
//!     → MetricsRegistry::render (Prometheus text format)
//!
//! GET /health
//!     → "ok" (the process is up; upstream state lives in the metrics)
//! ```

pub mod server;

pub use server::{MetricsServer, HEALTH_PATH};
