//! Transport chain assembly.
//!
//! Whatever order the `with_*` calls come in, the chain is always:
//!
//! ```text
//! instrument ──▶ auth (api key | token | session id) ──▶ cache ──▶ network
//! ```
//!
//! Recorded latency includes authentication and cache hits.

use std::sync::Arc;

use http::header::{HeaderName, HeaderValue};
use tower::{Layer, Service};

use super::auth::{ApiKeyLayer, SessionIdLayer, TokenAuthLayer, TokenSource, TokenStore};
use super::instrument::{InstrumentLayer, TransportMetrics};
use super::path::PathNormalizer;
use super::types::{BoxTransport, HttpRequest, HttpResponse, TransportError};
use crate::cache::{CacheLayer, CacheMetrics, CacheTable, ResponseCache};
use crate::observability::metrics::{MetricsRegistry, UpstreamLabels};

enum Auth {
    ApiKey(ApiKeyLayer),
    Token(TokenAuthLayer),
    Session(SessionIdLayer),
}

/// Builds a [`BoxTransport`] around a network service.
pub struct TransportBuilder<S> {
    base: S,
    normalizer: PathNormalizer,
    auth: Option<Auth>,
    cache: Option<(Arc<CacheTable>, Arc<ResponseCache>)>,
    metrics: Option<(MetricsRegistry, UpstreamLabels)>,
}

impl<S> TransportBuilder<S>
where
    S: Service<HttpRequest, Response = HttpResponse, Error = TransportError>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
{
    pub fn new(base: S) -> Self {
        Self {
            base,
            normalizer: PathNormalizer::new(),
            auth: None,
            cache: None,
            metrics: None,
        }
    }

    pub fn with_path_normalizer(mut self, normalizer: PathNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Attach `value` as `header` to every request.
    pub fn with_api_key(mut self, header: HeaderName, value: HeaderValue) -> Self {
        self.auth = Some(Auth::ApiKey(ApiKeyLayer::new(header, value)));
        self
    }

    /// Attach a lazily obtained token as `header` to every request.
    pub fn with_token_auth(
        mut self,
        header: HeaderName,
        store: Arc<TokenStore>,
        source: Arc<dyn TokenSource>,
    ) -> Self {
        self.auth = Some(Auth::Token(TokenAuthLayer::new(header, store, source)));
        self
    }

    /// Negotiate a session id carried as `header`.
    pub fn with_session_id(mut self, header: HeaderName, store: Arc<TokenStore>) -> Self {
        self.auth = Some(Auth::Session(SessionIdLayer::new(header, store)));
        self
    }

    pub fn with_cache(mut self, table: Arc<CacheTable>, store: Arc<ResponseCache>) -> Self {
        self.cache = Some((table, store));
        self
    }

    /// Record transport (and cache) metrics into `registry`.
    pub fn with_metrics(mut self, registry: MetricsRegistry, labels: UpstreamLabels) -> Self {
        self.metrics = Some((registry, labels));
        self
    }

    /// Compose the chain, registering metrics if requested.
    pub fn build(self) -> Result<BoxTransport, prometheus::Error> {
        let normalizer = Arc::new(self.normalizer);
        let mut transport = BoxTransport::new(self.base);

        if let Some((table, store)) = self.cache {
            let mut layer = CacheLayer::new(table, store);
            if let Some((registry, labels)) = &self.metrics {
                layer = layer.with_metrics(CacheMetrics::new(registry, labels, normalizer.clone())?);
            }
            transport = BoxTransport::new(layer.layer(transport));
        }

        match self.auth {
            Some(Auth::ApiKey(layer)) => transport = BoxTransport::new(layer.layer(transport)),
            Some(Auth::Token(layer)) => transport = BoxTransport::new(layer.layer(transport)),
            Some(Auth::Session(layer)) => transport = BoxTransport::new(layer.layer(transport)),
            None => {}
        }

        if let Some((registry, labels)) = &self.metrics {
            let metrics = TransportMetrics::new(registry, labels)?;
            transport = BoxTransport::new(InstrumentLayer::new(metrics, normalizer).layer(transport));
        }

        Ok(transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::types::AuthError;
    use async_trait::async_trait;
    use bytes::Bytes;
    use http::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;

    struct StaticSource(AtomicUsize, &'static str);

    #[async_trait]
    impl TokenSource for StaticSource {
        async fn fetch_token(&self) -> Result<String, AuthError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(self.1.to_string())
        }
    }

    fn request(path: &str) -> HttpRequest {
        http::Request::get(format!("http://upstream{path}"))
            .body(Bytes::new())
            .unwrap()
    }

    #[tokio::test]
    async fn test_chain_order() {
        let network_calls = Arc::new(AtomicUsize::new(0));
        let calls = network_calls.clone();
        let base = tower::service_fn(move |req: HttpRequest| {
            calls.fetch_add(1, Ordering::SeqCst);
            let authorized = req.headers().get("x-token").is_some();
            async move {
                let status = if authorized { StatusCode::OK } else { StatusCode::UNAUTHORIZED };
                Ok::<_, TransportError>(http::Response::builder().status(status).body(Bytes::new()).unwrap())
            }
        });

        let source = Arc::new(StaticSource(AtomicUsize::new(0), "tok"));
        let registry = MetricsRegistry::new("test");
        let ttl = Duration::from_secs(60);
        let transport = TransportBuilder::new(base)
            .with_metrics(registry.clone(), UpstreamLabels::new("plex", "plex"))
            .with_cache(
                Arc::new(CacheTable::cache_everything(ttl)),
                Arc::new(ResponseCache::new(ttl)),
            )
            .with_token_auth(
                HeaderName::from_static("x-token"),
                Arc::new(TokenStore::new()),
                source.clone(),
            )
            .with_path_normalizer(PathNormalizer::new().with_prefix("/library/metadata"))
            .build()
            .unwrap();

        for _ in 0..3 {
            let response = transport
                .clone()
                .oneshot(request("/library/metadata/12/children"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        assert_eq!(network_calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.0.load(Ordering::SeqCst), 1);

        let text = registry.render().unwrap();
        assert!(text.contains(
            r#"test_api_latency_seconds_count{application="plex",method="GET",path="/library/metadata",upstream="plex"} 3"#
        ));
        assert!(text.contains(
            r#"test_cache_hits_total{application="plex",method="GET",path="/library/metadata",upstream="plex"} 2"#
        ));
    }

    #[tokio::test]
    async fn test_stale_token_rejection_is_not_cached() {
        let network_calls = Arc::new(AtomicUsize::new(0));
        let calls = network_calls.clone();
        let base = tower::service_fn(move |req: HttpRequest| {
            calls.fetch_add(1, Ordering::SeqCst);
            let fresh = req.headers().get("x-token").is_some_and(|v| v == "fresh");
            async move {
                let status = if fresh { StatusCode::OK } else { StatusCode::UNAUTHORIZED };
                Ok::<_, TransportError>(http::Response::builder().status(status).body(Bytes::new()).unwrap())
            }
        });

        let source = Arc::new(StaticSource(AtomicUsize::new(0), "fresh"));
        let ttl = Duration::from_secs(60);
        let transport = TransportBuilder::new(base)
            .with_cache(
                Arc::new(CacheTable::cache_everything(ttl)),
                Arc::new(ResponseCache::new(ttl)),
            )
            .with_token_auth(
                HeaderName::from_static("x-token"),
                Arc::new(TokenStore::with_token("stale")),
                source.clone(),
            )
            .build()
            .unwrap();

        let mut statuses = Vec::new();
        for _ in 0..4 {
            let response = transport.clone().oneshot(request("/status/sessions")).await.unwrap();
            statuses.push(response.status().as_u16());
        }

        assert_eq!(statuses, vec![401, 200, 200, 200]);
        assert_eq!(network_calls.load(Ordering::SeqCst), 2);
        assert_eq!(source.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_plain_chain() {
        let base = tower::service_fn(|_req: HttpRequest| async {
            Ok::<_, TransportError>(http::Response::new(Bytes::from_static(b"plain")))
        });
        let transport = TransportBuilder::new(base).build().unwrap();
        let response = transport.oneshot(request("/")).await.unwrap();
        assert_eq!(response.body(), &Bytes::from_static(b"plain"));
    }
}
