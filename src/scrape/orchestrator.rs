//! Per-scrape fan-out over the categories of a [`StatsSource`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;

use super::{Category, CategoryResult, CategoryValue, StatsSource};
use crate::upstream::UpstreamError;

/// Results of one scrape, ordered by category.
#[derive(Debug)]
pub struct ScrapeReport {
    pub results: Vec<CategoryResult>,
    pub elapsed: Duration,
}

impl ScrapeReport {
    /// Values of the categories that succeeded.
    pub fn values(&self) -> impl Iterator<Item = &CategoryValue> {
        self.results.iter().filter_map(|r| r.outcome.as_ref().ok())
    }

    /// Categories that failed, with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (Category, &UpstreamError)> {
        self.results
            .iter()
            .filter_map(|r| r.outcome.as_ref().err().map(|e| (r.category, e)))
    }

    pub fn is_complete(&self) -> bool {
        self.results.iter().all(|r| r.outcome.is_ok())
    }
}

/// Collects all categories of one source concurrently.
#[derive(Clone)]
pub struct Scraper {
    name: String,
    source: Arc<dyn StatsSource>,
    timeout: Duration,
}

impl Scraper {
    /// `timeout` bounds each category fetch.
    pub fn new(name: impl Into<String>, source: Arc<dyn StatsSource>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            source,
            timeout,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fetch every category, one task each, and merge the results.
    pub async fn scrape(&self) -> ScrapeReport {
        let start = Instant::now();
        let categories = self.source.categories();
        let (sink, mut results_rx) = mpsc::channel(categories.len().max(1));
        let mut tasks = JoinSet::new();
        let mut pending = HashMap::with_capacity(categories.len());

        for &category in categories {
            let source = self.source.clone();
            let sink = sink.clone();
            let timeout = self.timeout;
            let handle = tasks.spawn(async move {
                let outcome = match tokio::time::timeout(timeout, source.fetch(category)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(UpstreamError::Timeout(timeout)),
                };
                let _ = sink.send(CategoryResult { category, outcome }).await;
            });
            pending.insert(handle.id(), category);
        }
        drop(sink);

        let mut results = Vec::with_capacity(categories.len());
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, ())) => {
                    pending.remove(&id);
                }
                Err(e) => {
                    if let Some(category) = pending.remove(&e.id()) {
                        results.push(CategoryResult::failed(
                            category,
                            UpstreamError::TaskFailed(e.to_string()),
                        ));
                    }
                }
            }
        }
        while let Some(result) = results_rx.recv().await {
            results.push(result);
        }
        results.sort_by_key(|r| r.category);

        for result in &results {
            if let Err(e) = &result.outcome {
                tracing::warn!(
                    upstream = %self.name,
                    category = %result.category,
                    error = %e,
                    "Failed to collect category"
                );
            }
        }

        let report = ScrapeReport {
            results,
            elapsed: start.elapsed(),
        };
        tracing::debug!(
            upstream = %self.name,
            elapsed_ms = report.elapsed.as_millis() as u64,
            complete = report.is_complete(),
            "Scrape finished"
        );
        report
    }
}
