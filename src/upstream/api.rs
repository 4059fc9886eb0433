//! JSON-over-HTTP helper shared by the vendor clients.

use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE};
use http::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tower::ServiceExt;
use url::Url;

use super::types::{UpstreamError, UpstreamResult};
use crate::transport::{BoxTransport, HttpRequest};

/// Issues requests relative to a base URL and decodes JSON bodies.
#[derive(Clone)]
pub struct ApiClient {
    base: Url,
    transport: BoxTransport,
}

impl ApiClient {
    pub fn new(base_url: &str, transport: BoxTransport) -> UpstreamResult<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| UpstreamError::InvalidUrl(format!("'{}': {}", base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(UpstreamError::InvalidUrl(format!("'{}' cannot be a base URL", base_url)));
        }
        Ok(Self { base, transport })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Absolute URL for `path_and_query`, keeping any path prefix of the base.
    pub fn url(&self, path_and_query: &str) -> String {
        format!(
            "{}{}",
            self.base.as_str().trim_end_matches('/'),
            path_and_query
        )
    }

    /// GET `path_and_query` and decode the body as `T`.
    pub async fn get_json<T: DeserializeOwned>(&self, path_and_query: &str) -> UpstreamResult<T> {
        let request = http::Request::get(self.url(path_and_query))
            .header(ACCEPT, "application/json")
            .body(Bytes::new())
            .map_err(|e| UpstreamError::InvalidUrl(e.to_string()))?;
        self.send(path_and_query, request).await
    }

    /// GET `path_and_query` and return only the response status.
    pub async fn get_status(&self, path_and_query: &str) -> UpstreamResult<StatusCode> {
        let request = http::Request::get(self.url(path_and_query))
            .body(Bytes::new())
            .map_err(|e| UpstreamError::InvalidUrl(e.to_string()))?;
        let response = self.transport.clone().oneshot(request).await?;
        Ok(response.status())
    }

    /// POST `body` as JSON to `path_and_query` and decode the reply as `T`.
    pub async fn post_json<B, T>(&self, path_and_query: &str, body: &B) -> UpstreamResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let path = path_only(path_and_query);
        let payload = serde_json::to_vec(body).map_err(|source| UpstreamError::Decode {
            path: path.to_string(),
            source,
        })?;
        let request = http::Request::post(self.url(path_and_query))
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .body(Bytes::from(payload))
            .map_err(|e| UpstreamError::InvalidUrl(e.to_string()))?;
        self.send(path_and_query, request).await
    }

    async fn send<T: DeserializeOwned>(&self, path_and_query: &str, request: HttpRequest) -> UpstreamResult<T> {
        let path = path_only(path_and_query);
        let response = self.transport.clone().oneshot(request).await?;
        if !response.status().is_success() {
            return Err(UpstreamError::Status {
                status: response.status(),
                path: path.to_string(),
            });
        }

        serde_json::from_slice(response.body()).map_err(|source| UpstreamError::Decode {
            path: path.to_string(),
            source,
        })
    }
}

fn path_only(path_and_query: &str) -> &str {
    path_and_query
        .split_once('?')
        .map_or(path_and_query, |(path, _)| path)
}
