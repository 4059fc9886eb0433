//! Latency and error recording.
//!
//! Purely observational: requests and responses pass through unchanged.

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use futures_util::future::BoxFuture;
use prometheus::{HistogramVec, IntCounterVec};
use tower::{Layer, Service};

use super::path::PathNormalizer;
use super::types::{HttpRequest, HttpResponse, TransportError};
use crate::observability::metrics::{MetricsRegistry, UpstreamLabels};

/// Per-upstream transport metrics, labelled by method and normalized path.
#[derive(Clone)]
pub struct TransportMetrics {
    latency: HistogramVec,
    errors: IntCounterVec,
}

impl TransportMetrics {
    /// Create and register the metrics.
    pub fn new(registry: &MetricsRegistry, labels: &UpstreamLabels) -> Result<Self, prometheus::Error> {
        let latency = HistogramVec::new(
            registry.histogram_opts("api", "latency_seconds", "Upstream API call latency", labels),
            &["method", "path"],
        )?;
        let errors = IntCounterVec::new(
            registry.opts("api", "errors_total", "Upstream API call errors", labels),
            &["method", "path"],
        )?;
        registry.register(latency.clone())?;
        registry.register(errors.clone())?;
        Ok(Self { latency, errors })
    }

    pub fn latency(&self) -> &HistogramVec {
        &self.latency
    }

    pub fn errors(&self) -> &IntCounterVec {
        &self.errors
    }
}

/// Layer recording latency and errors for every call.
#[derive(Clone)]
pub struct InstrumentLayer {
    metrics: TransportMetrics,
    normalizer: Arc<PathNormalizer>,
}

impl InstrumentLayer {
    pub fn new(metrics: TransportMetrics, normalizer: Arc<PathNormalizer>) -> Self {
        Self {
            metrics,
            normalizer,
        }
    }
}

impl<S> Layer<S> for InstrumentLayer {
    type Service = Instrumented<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Instrumented {
            inner,
            metrics: self.metrics.clone(),
            normalizer: self.normalizer.clone(),
        }
    }
}

/// Service produced by [`InstrumentLayer`].
#[derive(Clone)]
pub struct Instrumented<S> {
    inner: S,
    metrics: TransportMetrics,
    normalizer: Arc<PathNormalizer>,
}

impl<S> Service<HttpRequest> for Instrumented<S>
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
        let method = req.method().as_str().to_string();
        let path = self.normalizer.normalize(req.uri().path());
        let metrics = self.metrics.clone();
        let start = Instant::now();
        let fut = self.inner.call(req);

        Box::pin(async move {
            let result = fut.await;
            let labels = [method.as_str(), path.as_str()];
            metrics
                .latency
                .with_label_values(&labels)
                .observe(start.elapsed().as_secs_f64());

            let failed = match &result {
                Ok(response) => !response.status().is_success(),
                Err(_) => true,
            };
            let errors = metrics.errors.with_label_values(&labels);
            if failed {
                errors.inc();
            } else {
                errors.inc_by(0);
            }

            if let Err(e) = &result {
                tracing::debug!(method = %method, path = %path, error = %e, "Upstream call failed");
            }
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::types::BoxTransport;
    use bytes::Bytes;
    use http::StatusCode;
    use tower::ServiceExt;

    fn backend() -> BoxTransport {
        BoxTransport::new(tower::service_fn(|req: HttpRequest| async move {
            match req.uri().path() {
                "/down" => Err(TransportError::Network("connection refused".to_string())),
                "/missing/7" => Ok(http::Response::builder()
                    .status(StatusCode::NOT_FOUND)
                    .body(Bytes::new())
                    .unwrap()),
                _ => Ok(http::Response::new(Bytes::from_static(b"ok"))),
            }
        }))
    }

    fn request(path: &str) -> HttpRequest {
        http::Request::get(format!("http://upstream{path}"))
            .body(Bytes::new())
            .unwrap()
    }

    #[tokio::test]
    async fn test_records_latency_and_errors() {
        let registry = MetricsRegistry::new("test");
        let metrics = TransportMetrics::new(&registry, &UpstreamLabels::new("sonarr", "tv")).unwrap();
        let svc = InstrumentLayer::new(metrics.clone(), Arc::new(PathNormalizer::new())).layer(backend());

        svc.clone().oneshot(request("/movie/42")).await.unwrap();
        svc.clone().oneshot(request("/movie/43")).await.unwrap();
        let response = svc.clone().oneshot(request("/missing/7")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(svc.clone().oneshot(request("/down")).await.is_err());

        let latency = metrics.latency().with_label_values(&["GET", "/movie"]);
        assert_eq!(latency.get_sample_count(), 2);

        let errors = |path: &str| metrics.errors().with_label_values(&["GET", path]).get();
        assert_eq!(errors("/movie"), 0);
        assert_eq!(errors("/missing"), 1);
        assert_eq!(errors("/down"), 1);

        let text = registry.render().unwrap();
        assert!(text.contains(r#"test_api_errors_total{application="sonarr",method="GET",path="/movie",upstream="tv"} 0"#));
    }
}
