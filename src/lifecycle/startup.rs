//! Startup orchestration.
//!
//! # Responsibilities
//! - Turn each configured upstream into a breaker-guarded collector
//! - Assemble the transport chain per upstream
//! - Start the response cache sweepers
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Every upstream gets its own transport, cache and breaker
//! - Sweepers are owned by the [`Monitor`] and stopped with it
//! - Refreshes are serialized: a gather renders the samples of its own refresh

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use http::header::{HeaderName, HeaderValue, InvalidHeaderValue};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::cache::{CacheTable, CacheTableError, ResponseCache};
use crate::config::loader::{cache_table, ConfigError};
use crate::config::schema::{MonitorConfig, UpstreamConfig, UpstreamKind};
use crate::observability::metrics::{MetricsRegistry, UpstreamLabels};
use crate::resilience::circuit_breaker::BreakerSettings;
use crate::scrape::{
    ArrGauges, ArrSource, OpenVpnGauges, OpenVpnSource, PlexGauges, PlexSource, ProwlarrGauges, ProwlarrSource,
    Publisher, Scraper, StatsSource, TransmissionGauges, TransmissionSource, UpstreamCollector,
};
use crate::transport::{AuthError, HttpTransport, TokenStore, TransportBuilder, TransportError};
use crate::upstream::arr::API_KEY_HEADER;
use crate::upstream::plex::{self, TOKEN_HEADER};
use crate::upstream::transmission::SESSION_ID_HEADER;
use crate::upstream::{
    ApiClient, ArrClient, ArrKind, OpenVpnClient, PlexClient, PlexTvTokenSource, ProwlarrClient, TransmissionClient,
    UpstreamError,
};

/// Sweep interval used with the built-in cache tables.
const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Error raised while building the monitor.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    CacheRule(#[from] CacheTableError),

    #[error("metrics registration failed: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("upstream '{upstream}': {message}")]
    UpstreamConfig { upstream: String, message: String },

    #[error("invalid API key header value: {0}")]
    InvalidHeader(#[from] InvalidHeaderValue),
}

/// All collectors and the registry they publish into.
pub struct Monitor {
    registry: MetricsRegistry,
    collectors: Vec<Arc<UpstreamCollector>>,
    sweepers: Vec<JoinHandle<()>>,
    refresh_lock: Mutex<()>,
}

impl Monitor {
    /// Build one collector per configured upstream.
    ///
    /// Must be called inside a Tokio runtime; cache sweepers are spawned here.
    pub fn build(config: &MonitorConfig) -> Result<Self, StartupError> {
        let registry = MetricsRegistry::new(config.observability.namespace.clone());
        let transport = HttpTransport::new(Duration::from_secs(config.scrape.request_timeout_secs))?;

        let mut monitor = Self {
            registry,
            collectors: Vec::with_capacity(config.upstreams.len()),
            sweepers: Vec::new(),
            refresh_lock: Mutex::new(()),
        };
        for upstream in &config.upstreams {
            let collector = monitor.build_collector(config, upstream, transport.clone())?;
            tracing::info!(
                upstream = %upstream.name,
                kind = upstream.kind.as_str(),
                url = %upstream.url,
                "Upstream registered"
            );
            monitor.collectors.push(Arc::new(collector));
        }
        Ok(monitor)
    }

    fn build_collector(
        &mut self,
        config: &MonitorConfig,
        upstream: &UpstreamConfig,
        transport: HttpTransport,
    ) -> Result<UpstreamCollector, StartupError> {
        let labels = UpstreamLabels::new(upstream.kind.as_str(), upstream.name.clone());
        let request_timeout = Duration::from_secs(config.scrape.request_timeout_secs);
        let builder = TransportBuilder::new(transport).with_metrics(self.registry.clone(), labels.clone());

        let (source, publisher): (Arc<dyn StatsSource>, Arc<dyn Publisher>) = match upstream.kind {
            UpstreamKind::Sonarr | UpstreamKind::Radarr => {
                let kind = if upstream.kind == UpstreamKind::Sonarr {
                    ArrKind::Sonarr
                } else {
                    ArrKind::Radarr
                };
                let api_key = api_key_header(upstream)?;

                let (table, cleanup) = match &upstream.cache {
                    Some(cache) => (
                        cache_table(cache)?,
                        Duration::from_secs(cache.cleanup_interval_secs),
                    ),
                    None => {
                        let table = kind.default_cache_table();
                        table.compile()?;
                        (table, DEFAULT_CLEANUP_INTERVAL)
                    }
                };
                let store = self.response_cache(&table, cleanup);

                let transport = builder
                    .with_api_key(HeaderName::from_static(API_KEY_HEADER), api_key)
                    .with_cache(Arc::new(table), store)
                    .build()?;
                let client = ArrClient::new(kind, ApiClient::new(&upstream.url, transport)?, upstream.calendar_days);
                let source: Arc<dyn StatsSource> = Arc::new(ArrSource::new(client));
                let publisher: Arc<dyn Publisher> = Arc::new(ArrGauges::new(&self.registry, &labels)?);
                (source, publisher)
            }
            UpstreamKind::Plex => {
                let (username, password) = match (&upstream.username, &upstream.password) {
                    (Some(username), Some(password)) => (username, password),
                    _ => {
                        return Err(StartupError::UpstreamConfig {
                            upstream: upstream.name.clone(),
                            message: "username and password are required".to_string(),
                        })
                    }
                };
                let tokens = match &upstream.token {
                    Some(token) => TokenStore::with_token(token.clone()),
                    None => TokenStore::new(),
                };
                let sign_in = PlexTvTokenSource::new(username.clone(), password.clone(), request_timeout)?;

                let mut builder = builder.with_path_normalizer(plex::path_normalizer()).with_token_auth(
                    HeaderName::from_static(TOKEN_HEADER),
                    Arc::new(tokens),
                    Arc::new(sign_in),
                );
                if let Some(cache) = &upstream.cache {
                    let table = cache_table(cache)?;
                    let store = self.response_cache(&table, Duration::from_secs(cache.cleanup_interval_secs));
                    builder = builder.with_cache(Arc::new(table), store);
                }

                let client = PlexClient::new(ApiClient::new(&upstream.url, builder.build()?)?);
                let refresh_interval = Duration::from_secs(upstream.refresh_interval_secs);
                let source: Arc<dyn StatsSource> = Arc::new(PlexSource::new(client, refresh_interval));
                let publisher: Arc<dyn Publisher> = Arc::new(PlexGauges::new(&self.registry, &labels)?);
                (source, publisher)
            }
            UpstreamKind::Prowlarr => {
                let mut builder = builder.with_api_key(HeaderName::from_static(API_KEY_HEADER), api_key_header(upstream)?);
                if let Some(cache) = &upstream.cache {
                    let table = cache_table(cache)?;
                    let store = self.response_cache(&table, Duration::from_secs(cache.cleanup_interval_secs));
                    builder = builder.with_cache(Arc::new(table), store);
                }

                let client = ProwlarrClient::new(ApiClient::new(&upstream.url, builder.build()?)?);
                let refresh_interval = Duration::from_secs(upstream.refresh_interval_secs);
                let source: Arc<dyn StatsSource> = Arc::new(ProwlarrSource::new(client, refresh_interval));
                let publisher: Arc<dyn Publisher> = Arc::new(ProwlarrGauges::new(&self.registry, &labels)?);
                (source, publisher)
            }
            UpstreamKind::Transmission => {
                let transport = builder
                    .with_session_id(HeaderName::from_static(SESSION_ID_HEADER), Arc::new(TokenStore::new()))
                    .build()?;
                let client = TransmissionClient::new(ApiClient::new(&upstream.url, transport)?);
                let source: Arc<dyn StatsSource> = Arc::new(TransmissionSource::new(client));
                let publisher: Arc<dyn Publisher> = Arc::new(TransmissionGauges::new(&self.registry, &labels)?);
                (source, publisher)
            }
            UpstreamKind::Openvpn => {
                let client = OpenVpnClient::new(
                    upstream.status_file.clone(),
                    ApiClient::new(&upstream.url, builder.build()?)?,
                );
                let refresh_interval = Duration::from_secs(upstream.refresh_interval_secs);
                let source: Arc<dyn StatsSource> = Arc::new(OpenVpnSource::new(client, refresh_interval));
                let publisher: Arc<dyn Publisher> = Arc::new(OpenVpnGauges::new(&self.registry, &labels)?);
                (source, publisher)
            }
        };

        let scraper = Scraper::new(
            upstream.name.clone(),
            source,
            Duration::from_secs(config.scrape.timeout_secs),
        );
        let collector = UpstreamCollector::new(scraper, BreakerSettings::from(&upstream.breaker), publisher)
            .with_state_gauge(&self.registry, &labels)?;
        Ok(collector)
    }

    fn response_cache(&mut self, table: &CacheTable, cleanup: Duration) -> Arc<ResponseCache> {
        let store = Arc::new(ResponseCache::new(table.default_ttl()));
        if let Some(handle) = store.spawn_cleanup(cleanup) {
            self.sweepers.push(handle);
        }
        store
    }

    pub fn registry(&self) -> &MetricsRegistry {
        &self.registry
    }

    pub fn collectors(&self) -> &[Arc<UpstreamCollector>] {
        &self.collectors
    }

    /// Refresh every upstream concurrently. Returns how many succeeded.
    pub async fn refresh_all(&self) -> usize {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> usize {
        let start = Instant::now();
        let results = join_all(self.collectors.iter().map(|c| c.refresh())).await;
        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        tracing::debug!(
            upstreams = results.len(),
            succeeded,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Refresh finished"
        );
        succeeded
    }

    /// Refresh every upstream and render the registry.
    ///
    /// Concurrent gathers queue up; each renders only after its own refresh
    /// published, never while another refresh has reset the gauges.
    pub async fn gather(&self) -> Result<String, prometheus::Error> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await;
        self.registry.render()
    }

    /// Stop the cache sweepers.
    pub fn shutdown(&self) {
        for sweeper in &self.sweepers {
            sweeper.abort();
        }
    }
}

fn api_key_header(upstream: &UpstreamConfig) -> Result<HeaderValue, StartupError> {
    let api_key = upstream.api_key.as_deref().ok_or_else(|| StartupError::UpstreamConfig {
        upstream: upstream.name.clone(),
        message: "api_key is required".to_string(),
    })?;
    Ok(HeaderValue::from_str(api_key)?)
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{BreakerConfig, CacheConfig, CacheRuleConfig};

    fn upstream(name: &str, kind: UpstreamKind) -> UpstreamConfig {
        UpstreamConfig {
            name: name.to_string(),
            kind,
            url: "http://127.0.0.1:9".to_string(),
            api_key: Some("key".to_string()),
            username: Some("user".to_string()),
            password: Some("pass".to_string()),
            token: None,
            calendar_days: 1,
            refresh_interval_secs: 900,
            status_file: None,
            breaker: BreakerConfig::default(),
            cache: None,
        }
    }

    #[tokio::test]
    async fn test_build_registers_every_upstream() {
        let config = MonitorConfig {
            upstreams: vec![
                upstream("tv", UpstreamKind::Sonarr),
                upstream("movies", UpstreamKind::Radarr),
                upstream("plex", UpstreamKind::Plex),
                upstream("indexers", UpstreamKind::Prowlarr),
                upstream("torrents", UpstreamKind::Transmission),
                upstream("vpn", UpstreamKind::Openvpn),
            ],
            ..Default::default()
        };

        let monitor = Monitor::build(&config).unwrap();
        let names: Vec<&str> = monitor.collectors().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["tv", "movies", "plex", "indexers", "torrents", "vpn"]);
        assert_eq!(monitor.sweepers.len(), 2);

        let text = monitor.registry().render().unwrap();
        assert!(text.contains(r#"mediamon_breaker_state{application="radarr",upstream="movies"} 0"#));
        assert!(text.contains(r#"mediamon_breaker_state{application="transmission",upstream="torrents"} 0"#));
        assert!(!text.contains("mediamon_plex_session_count"), "{text}");
        assert!(!text.contains("mediamon_xxxarr_monitored_count"), "{text}");
    }

    #[tokio::test]
    async fn test_invalid_cache_rule_fails_startup() {
        let mut tv = upstream("tv", UpstreamKind::Sonarr);
        tv.cache = Some(CacheConfig {
            rules: vec![CacheRuleConfig {
                path: "(".to_string(),
                regex: true,
                ttl_secs: 0,
            }],
            ..Default::default()
        });
        let config = MonitorConfig {
            upstreams: vec![tv],
            ..Default::default()
        };

        assert!(matches!(
            Monitor::build(&config),
            Err(StartupError::Config(ConfigError::InvalidRule(_)))
        ));
    }

    #[tokio::test]
    async fn test_empty_monitor_renders_nothing() {
        let monitor = Monitor::build(&MonitorConfig::default()).unwrap();
        assert_eq!(monitor.refresh_all().await, 0);
        assert_eq!(monitor.gather().await.unwrap(), "");
    }
}
