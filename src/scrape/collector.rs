//! Breaker-guarded collection for one upstream.

use std::sync::Arc;

use prometheus::IntGauge;
use thiserror::Error;

use super::gauges::Publisher;
use super::orchestrator::{ScrapeReport, Scraper};
use super::Category;
use crate::observability::metrics::{MetricsRegistry, UpstreamLabels};
use crate::resilience::circuit_breaker::{BreakerError, BreakerSettings, BreakerState, CircuitBreaker};

/// A scrape in which at least one category failed.
#[derive(Debug, Error)]
#[error("{upstream}: {} categories failed ({})", .failed.len(), failed_names(.failed))]
pub struct ScrapeError {
    pub upstream: String,
    pub failed: Vec<Category>,
}

fn failed_names(failed: &[Category]) -> String {
    failed
        .iter()
        .map(Category::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Refreshes the gauges of one upstream through its circuit breaker.
pub struct UpstreamCollector {
    scraper: Scraper,
    breaker: CircuitBreaker,
    publisher: Arc<dyn Publisher>,
}

impl UpstreamCollector {
    pub fn new(scraper: Scraper, settings: BreakerSettings, publisher: Arc<dyn Publisher>) -> Self {
        let breaker = CircuitBreaker::new(scraper.name(), settings);
        Self {
            scraper,
            breaker,
            publisher,
        }
    }

    /// Export the breaker state as `<ns>_breaker_state`.
    pub fn with_state_gauge(
        mut self,
        registry: &MetricsRegistry,
        labels: &UpstreamLabels,
    ) -> Result<Self, prometheus::Error> {
        let gauge = IntGauge::with_opts(registry.opts(
            "",
            "breaker_state",
            "Circuit breaker state (0 closed, 1 half-open, 2 open)",
            labels,
        ))?;
        registry.register(gauge.clone())?;
        self.breaker = self.breaker.with_state_gauge(gauge);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        self.scraper.name()
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Scrape the upstream and publish the results.
    ///
    /// While the breaker is open the upstream is not contacted and its gauges
    /// are cleared. Categories that succeeded are published even when others
    /// failed; the scrape then still counts as a breaker failure.
    pub async fn refresh(&self) -> Result<ScrapeReport, BreakerError<ScrapeError>> {
        let result = self
            .breaker
            .execute(|| async {
                let report = self.scraper.scrape().await;
                self.publisher.reset();
                for value in report.values() {
                    self.publisher.publish(value);
                }

                let failed: Vec<Category> = report.failures().map(|(category, _)| category).collect();
                if failed.is_empty() {
                    Ok(report)
                } else {
                    Err(ScrapeError {
                        upstream: self.name().to_string(),
                        failed,
                    })
                }
            })
            .await;

        if let Err(BreakerError::Open) = &result {
            self.publisher.reset();
            tracing::debug!(upstream = %self.name(), "Circuit is open, skipping scrape");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrape::{ArrGauges, CategoryValue, StatsSource};
    use crate::upstream::{Library, UpstreamError, UpstreamResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct SwitchableSource {
        down: AtomicBool,
        calls: AtomicU32,
    }

    #[async_trait]
    impl StatsSource for SwitchableSource {
        fn categories(&self) -> &'static [Category] {
            &[Category::Version, Category::Sessions]
        }

        async fn fetch(&self, category: Category) -> UpstreamResult<CategoryValue> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match category {
                Category::Sessions if self.down.load(Ordering::SeqCst) => {
                    Err(UpstreamError::Unsupported("down"))
                }
                Category::Sessions => Ok(CategoryValue::Sessions(Vec::new())),
                _ => Ok(CategoryValue::Version("1.0".to_string())),
            }
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        published: Mutex<Vec<CategoryValue>>,
        resets: AtomicU32,
    }

    impl Publisher for RecordingPublisher {
        fn reset(&self) {
            self.resets.fetch_add(1, Ordering::SeqCst);
            self.published.lock().unwrap().clear();
        }

        fn publish(&self, value: &CategoryValue) {
            self.published.lock().unwrap().push(value.clone());
        }
    }

    fn collector(source: Arc<SwitchableSource>, publisher: Arc<RecordingPublisher>) -> UpstreamCollector {
        let settings = BreakerSettings {
            failure_threshold: 5,
            success_threshold: 1,
            open_duration: Duration::from_secs(30),
        };
        UpstreamCollector::new(
            Scraper::new("test", source, Duration::from_secs(1)),
            settings,
            publisher,
        )
    }

    #[tokio::test]
    async fn test_partial_failure_publishes_successes() {
        let source = Arc::new(SwitchableSource::default());
        source.down.store(true, Ordering::SeqCst);
        let publisher = Arc::new(RecordingPublisher::default());
        let collector = collector(source, publisher.clone());

        let err = collector.refresh().await.unwrap_err();
        let err = err.into_inner().unwrap();
        assert_eq!(err.failed, vec![Category::Sessions]);
        assert_eq!(
            *publisher.published.lock().unwrap(),
            vec![CategoryValue::Version("1.0".to_string())]
        );
        assert_eq!(collector.breaker().counters().consecutive_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_skips_scrape_and_clears_gauges() {
        let source = Arc::new(SwitchableSource::default());
        source.down.store(true, Ordering::SeqCst);
        let publisher = Arc::new(RecordingPublisher::default());
        let collector = collector(source.clone(), publisher.clone());

        for _ in 0..5 {
            assert!(!collector.refresh().await.unwrap_err().is_open());
        }
        assert_eq!(collector.breaker_state(), BreakerState::Open);
        let calls = source.calls.load(Ordering::SeqCst);

        assert!(collector.refresh().await.unwrap_err().is_open());
        assert_eq!(source.calls.load(Ordering::SeqCst), calls);
        assert!(publisher.published.lock().unwrap().is_empty());
        assert_eq!(publisher.resets.load(Ordering::SeqCst), 6);

        source.down.store(false, Ordering::SeqCst);
        tokio::time::advance(Duration::from_secs(30)).await;
        let report = collector.refresh().await.unwrap();
        assert!(report.is_complete());
        assert_eq!(collector.breaker_state(), BreakerState::Closed);
        assert_eq!(publisher.published.lock().unwrap().len(), 2);
    }

    struct LibrarySource {
        library_down: AtomicBool,
    }

    #[async_trait]
    impl StatsSource for LibrarySource {
        fn categories(&self) -> &'static [Category] {
            &[Category::Version, Category::Library]
        }

        async fn fetch(&self, category: Category) -> UpstreamResult<CategoryValue> {
            match category {
                Category::Library if self.library_down.load(Ordering::SeqCst) => {
                    Err(UpstreamError::Unsupported("down"))
                }
                Category::Library => Ok(CategoryValue::Library(Library {
                    monitored: 7,
                    unmonitored: 1,
                })),
                _ => Ok(CategoryValue::Version("4.0".to_string())),
            }
        }
    }

    #[tokio::test]
    async fn test_failed_category_is_absent_not_zero() {
        let registry = MetricsRegistry::new("test");
        let labels = UpstreamLabels::new("sonarr", "tv");
        let gauges = Arc::new(ArrGauges::new(&registry, &labels).unwrap());
        let source = Arc::new(LibrarySource {
            library_down: AtomicBool::new(false),
        });
        let collector = UpstreamCollector::new(
            Scraper::new("tv", source.clone(), Duration::from_secs(1)),
            BreakerSettings::default(),
            gauges,
        );

        collector.refresh().await.unwrap();
        let text = registry.render().unwrap();
        assert!(text.contains(r#"test_xxxarr_monitored_count{application="sonarr",upstream="tv"} 7"#));

        source.library_down.store(true, Ordering::SeqCst);
        collector.refresh().await.unwrap_err();
        let text = registry.render().unwrap();
        assert!(text.contains("test_xxxarr_version"), "{text}");
        assert!(!text.contains("test_xxxarr_monitored_count"), "{text}");
        assert!(!text.contains("test_xxxarr_unmonitored_count"), "{text}");
    }
}
