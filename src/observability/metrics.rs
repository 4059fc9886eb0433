//! Metrics registry and exposition.
//!
//! # Responsibilities
//! - Own the Prometheus registry every component registers against
//! - Build namespaced metric options with per-upstream const labels
//! - Render the registry in the Prometheus text format
//!
//! # Design Decisions
//! - No process-wide registry: a `MetricsRegistry` is created at startup and
//!   handed to each constructor, so tests can use isolated registries
//! - Per-upstream series carry `application` and `upstream` const labels;
//!   the same metric name may therefore be registered once per upstream

use std::collections::HashMap;

use prometheus::core::Collector;
use prometheus::{Encoder, HistogramOpts, Opts, Registry, TextEncoder};

/// Latency buckets in seconds, tuned for LAN-local HTTP APIs.
pub const LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Shared handle to the metrics registry.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    namespace: String,
}

impl MetricsRegistry {
    /// Create an empty registry whose metrics are prefixed with `namespace`.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            registry: Registry::new(),
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Register a collector.
    pub fn register<C>(&self, collector: C) -> Result<(), prometheus::Error>
    where
        C: Collector + 'static,
    {
        self.registry.register(Box::new(collector))
    }

    /// Options for a metric scoped to one upstream.
    pub fn opts(&self, subsystem: &str, name: &str, help: &str, labels: &UpstreamLabels) -> Opts {
        Opts::new(name, help)
            .namespace(self.namespace.clone())
            .subsystem(subsystem)
            .const_labels(labels.to_map())
    }

    /// Histogram options for a metric scoped to one upstream.
    pub fn histogram_opts(
        &self,
        subsystem: &str,
        name: &str,
        help: &str,
        labels: &UpstreamLabels,
    ) -> HistogramOpts {
        HistogramOpts::from(self.opts(subsystem, name, help, labels)).buckets(LATENCY_BUCKETS.to_vec())
    }

    /// Render all registered metrics in the text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::with_capacity(16 * 1024);
        encoder.encode(&families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("namespace", &self.namespace)
            .finish()
    }
}

/// Const labels identifying the upstream a series belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamLabels {
    pub application: String,
    pub upstream: String,
}

impl UpstreamLabels {
    pub fn new(application: impl Into<String>, upstream: impl Into<String>) -> Self {
        Self {
            application: application.into(),
            upstream: upstream.into(),
        }
    }

    fn to_map(&self) -> HashMap<String, String> {
        HashMap::from([
            ("application".to_string(), self.application.clone()),
            ("upstream".to_string(), self.upstream.clone()),
        ])
    }
}
