//! Response caching middleware.
//!
//! # Responsibilities
//! - Serve eligible requests from the store while their entry is fresh
//! - Store responses of eligible requests with the TTL from the table
//! - Count cache requests and hits per normalized path
//!
//! # Design Decisions
//! - Only GET requests are eligible; they are keyed by the full URI (path and
//!   query)
//! - Only successful responses are stored, so a rejected token or a failing
//!   upstream is never replayed
//! - Ineligible requests bypass the store entirely

use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::{HeaderMap, Method, StatusCode, Version};
use prometheus::IntCounterVec;
use tower::{Layer, Service};

use super::store::TtlCache;
use super::table::CacheTable;
use crate::observability::metrics::{MetricsRegistry, UpstreamLabels};
use crate::transport::path::PathNormalizer;
use crate::transport::types::{HttpRequest, HttpResponse, TransportError};

/// Store of cached responses keyed by URI.
pub type ResponseCache = TtlCache<String, CachedResponse>;

/// A stored response, replayed on hits.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
}

impl CachedResponse {
    pub fn from_response(response: &HttpResponse) -> Self {
        Self {
            status: response.status(),
            version: response.version(),
            headers: response.headers().clone(),
            body: response.body().clone(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn to_response(&self) -> HttpResponse {
        let mut response = http::Response::new(self.body.clone());
        *response.status_mut() = self.status;
        *response.version_mut() = self.version;
        *response.headers_mut() = self.headers.clone();
        response
    }
}

/// Cache request and hit counters.
#[derive(Clone)]
pub struct CacheMetrics {
    requests: IntCounterVec,
    hits: IntCounterVec,
    normalizer: Arc<PathNormalizer>,
}

impl CacheMetrics {
    /// Create and register the counters.
    pub fn new(
        registry: &MetricsRegistry,
        labels: &UpstreamLabels,
        normalizer: Arc<PathNormalizer>,
    ) -> Result<Self, prometheus::Error> {
        let requests = IntCounterVec::new(
            registry.opts("cache", "requests_total", "Cacheable upstream requests", labels),
            &["method", "path"],
        )?;
        let hits = IntCounterVec::new(
            registry.opts("cache", "hits_total", "Upstream requests served from cache", labels),
            &["method", "path"],
        )?;
        registry.register(requests.clone())?;
        registry.register(hits.clone())?;
        Ok(Self {
            requests,
            hits,
            normalizer,
        })
    }

    pub fn requests(&self) -> &IntCounterVec {
        &self.requests
    }

    pub fn hits(&self) -> &IntCounterVec {
        &self.hits
    }

    fn record(&self, method: &str, path: &str, hit: bool) {
        let path = self.normalizer.normalize(path);
        let labels = [method, path.as_str()];
        self.requests.with_label_values(&labels).inc();
        let hits = self.hits.with_label_values(&labels);
        if hit {
            hits.inc();
        } else {
            hits.inc_by(0);
        }
    }
}

/// Layer serving eligible requests from a [`ResponseCache`].
#[derive(Clone)]
pub struct CacheLayer {
    table: Arc<CacheTable>,
    store: Arc<ResponseCache>,
    metrics: Option<CacheMetrics>,
}

impl CacheLayer {
    pub fn new(table: Arc<CacheTable>, store: Arc<ResponseCache>) -> Self {
        Self {
            table,
            store,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: CacheMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn store(&self) -> &Arc<ResponseCache> {
        &self.store
    }
}

impl<S> Layer<S> for CacheLayer {
    type Service = Cached<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Cached {
            inner,
            table: self.table.clone(),
            store: self.store.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

/// Service produced by [`CacheLayer`].
#[derive(Clone)]
pub struct Cached<S> {
    inner: S,
    table: Arc<CacheTable>,
    store: Arc<ResponseCache>,
    metrics: Option<CacheMetrics>,
}

impl<S> Service<HttpRequest> for Cached<S>
where
    S: Service<HttpRequest, Response = HttpResponse, Error = TransportError>,
    S::Future: Send + 'static,
{
    type Response = HttpResponse;
    type Error = TransportError;
    type Future = BoxFuture<'static, Result<HttpResponse, TransportError>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: HttpRequest) -> Self::Future {
        let eligible = if req.method() == Method::GET {
            self.table.should_cache(req.uri().path())
        } else {
            None
        };
        let Some(ttl) = eligible else {
            return Box::pin(self.inner.call(req));
        };

        let key = req.uri().to_string();
        let hit = self.store.get(&key);
        if let Some(metrics) = &self.metrics {
            metrics.record(req.method().as_str(), req.uri().path(), hit.is_some());
        }
        if let Some(cached) = hit {
            tracing::trace!(uri = %key, "Cache hit");
            return Box::pin(futures_util::future::ready(Ok(cached.to_response())));
        }

        let store = self.store.clone();
        let fut = self.inner.call(req);
        Box::pin(async move {
            let response = fut.await?;
            if response.status().is_success() {
                store.insert(key, CachedResponse::from_response(&response), ttl);
            }
            Ok::<_, TransportError>(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::table::CacheRule;
    use crate::transport::types::BoxTransport;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;

    /// Answers 503 for `/down`, 200 otherwise.
    fn counting_backend(calls: Arc<AtomicUsize>) -> BoxTransport {
        BoxTransport::new(tower::service_fn(move |req: HttpRequest| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                let body = format!("{} #{n}", req.uri());
                let status = if req.uri().path() == "/down" {
                    StatusCode::SERVICE_UNAVAILABLE
                } else {
                    StatusCode::OK
                };
                Ok::<_, TransportError>(
                    http::Response::builder()
                        .status(status)
                        .header("x-call", n.to_string())
                        .body(Bytes::from(body))
                        .unwrap(),
                )
            }
        }))
    }

    fn request(uri: &str) -> HttpRequest {
        http::Request::get(uri).body(Bytes::new()).unwrap()
    }

    fn layer(rules: Vec<CacheRule>) -> CacheLayer {
        let default_ttl = Duration::from_secs(60);
        CacheLayer::new(
            Arc::new(CacheTable::new(rules, default_ttl)),
            Arc::new(ResponseCache::new(default_ttl)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_hit_within_ttl_and_miss_after() {
        let calls = Arc::new(AtomicUsize::new(0));
        let svc = layer(Vec::new()).layer(counting_backend(calls.clone()));

        let first = svc.clone().oneshot(request("http://upstream/foo")).await.unwrap();
        tokio::time::advance(Duration::from_secs(59)).await;
        let second = svc.clone().oneshot(request("http://upstream/foo")).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.body(), second.body());
        assert_eq!(second.headers()["x-call"], "1");

        tokio::time::advance(Duration::from_secs(1)).await;
        let third = svc.clone().oneshot(request("http://upstream/foo")).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(third.headers()["x-call"], "2");
    }

    #[tokio::test]
    async fn test_query_is_part_of_key() {
        let calls = Arc::new(AtomicUsize::new(0));
        let svc = layer(Vec::new()).layer(counting_backend(calls.clone()));

        svc.clone().oneshot(request("http://upstream/queue?page=1")).await.unwrap();
        svc.clone().oneshot(request("http://upstream/queue?page=2")).await.unwrap();
        svc.clone().oneshot(request("http://upstream/queue?page=1")).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_responses_are_not_stored() {
        let calls = Arc::new(AtomicUsize::new(0));
        let svc = layer(Vec::new()).layer(counting_backend(calls.clone()));

        for _ in 0..2 {
            let response = svc.clone().oneshot(request("http://upstream/down")).await.unwrap();
            assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_post_bypasses_cache() {
        let calls = Arc::new(AtomicUsize::new(0));
        let svc = layer(Vec::new()).layer(counting_backend(calls.clone()));

        for _ in 0..2 {
            let req = http::Request::post("http://upstream/rpc")
                .body(Bytes::from_static(b"{}"))
                .unwrap();
            svc.clone().oneshot(req).await.unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_ineligible_paths_bypass_cache() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = MetricsRegistry::new("test");
        let metrics = CacheMetrics::new(
            &registry,
            &UpstreamLabels::new("radarr", "movies"),
            Arc::new(PathNormalizer::new()),
        )
        .unwrap();
        let svc = layer(vec![CacheRule::regex(r"^/api/v3/movie", Duration::ZERO)])
            .with_metrics(metrics.clone())
            .layer(counting_backend(calls.clone()));

        for _ in 0..2 {
            svc.clone().oneshot(request("http://upstream/api/v3/health")).await.unwrap();
            svc.clone().oneshot(request("http://upstream/api/v3/movie/12")).await.unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let labels = ["GET", "/api/v3/movie"];
        assert_eq!(metrics.requests().with_label_values(&labels).get(), 2);
        assert_eq!(metrics.hits().with_label_values(&labels).get(), 1);
        assert_eq!(
            metrics.requests().with_label_values(&["GET", "/api/v3/health"]).get(),
            0
        );
    }
}
