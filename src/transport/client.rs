//! Network transport.
//!
//! The innermost service of every chain. Converts `http` requests into
//! `reqwest` requests and buffers the response body.

use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tower::Service;

use super::types::{HttpRequest, HttpResponse, TransportError};

/// `reqwest`-backed transport with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(request_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("upstream-monitor/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Service<HttpRequest> for HttpTransport {
    type Response = HttpResponse;
    type Error = TransportError;
    type Future = BoxFuture<'static, Result<HttpResponse, TransportError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: HttpRequest) -> Self::Future {
        let client = self.client.clone();
        Box::pin(async move {
            let req = reqwest::Request::try_from(req)
                .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
            let upstream = client.execute(req).await.map_err(map_reqwest_error)?;

            let mut response = http::Response::builder()
                .status(upstream.status())
                .version(upstream.version());
            if let Some(headers) = response.headers_mut() {
                *headers = upstream.headers().clone();
            }
            let body = upstream.bytes().await.map_err(map_reqwest_error)?;
            response
                .body(body)
                .map_err(|e| TransportError::InvalidRequest(e.to_string()))
        })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(e.to_string())
    }
}
