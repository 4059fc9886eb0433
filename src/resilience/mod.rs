//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! UpstreamCollector::refresh
//!     → circuit_breaker.rs (fail fast while open, track scrape outcomes)
//!     → Scraper::scrape
//! ```
//!
//! # Design Decisions
//! - One breaker per upstream, guarding the whole scrape
//! - No retries: a failed scrape waits for the next exposition request
//! - Per-request deadlines live in the transport, per-category deadlines in
//!   the scraper

pub mod circuit_breaker;

pub use circuit_breaker::{BreakerError, BreakerSettings, BreakerState, CircuitBreaker, Counters};
