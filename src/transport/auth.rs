//! Authentication middleware.
//!
//! # Responsibilities
//! - Attach a static API key to every request (`ApiKeyLayer`)
//! - Lazily obtain a token and attach it to every request (`TokenAuthLayer`)
//! - Drop the held token when the upstream answers 401 to it
//! - Pick up a session id from a 409 answer and replay the request with it
//!   (`SessionIdLayer`)
//!
//! # Design Decisions
//! - At most one authentication in flight: the store lock is held across
//!   the token source call, so concurrent first callers wait and reuse it
//! - A failed authentication leaves no token behind
//! - No automatic retry after a 401; the next call re-authenticates

use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use http::header::{HeaderName, HeaderValue};
use http::StatusCode;
use tokio::sync::Mutex;
use tower::{Layer, Service, ServiceExt};

use super::types::{AuthError, HttpRequest, HttpResponse, TransportError};

/// Something that can produce a fresh token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> Result<String, AuthError>;
}

/// Holds the current token, if any.
#[derive(Debug, Default)]
pub struct TokenStore {
    token: Mutex<Option<String>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that starts with `token`.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }

    pub async fn token(&self) -> Option<String> {
        self.token.lock().await.clone()
    }

    pub async fn set_token(&self, token: impl Into<String>) {
        *self.token.lock().await = Some(token.into());
    }

    pub async fn clear_token(&self) {
        *self.token.lock().await = None;
    }

    /// Drop the held token only if it is still `rejected`.
    ///
    /// Returns whether the token was dropped. A caller that authenticated in
    /// the meantime keeps its fresh token.
    pub async fn clear_if(&self, rejected: &str) -> bool {
        let mut token = self.token.lock().await;
        if token.as_deref() == Some(rejected) {
            *token = None;
            true
        } else {
            false
        }
    }

    /// Return the held token, authenticating through `source` if there is none.
    pub async fn get_or_authenticate(&self, source: &dyn TokenSource) -> Result<String, AuthError> {
        let mut token = self.token.lock().await;
        if let Some(current) = token.as_ref().filter(|t| !t.is_empty()) {
            return Ok(current.clone());
        }

        let fresh = source.fetch_token().await?;
        if fresh.is_empty() {
            return Err(AuthError::Decode("empty token".to_string()));
        }
        tracing::debug!("Obtained new authentication token");
        *token = Some(fresh.clone());
        Ok(fresh)
    }
}

/// Layer attaching a lazily obtained token.
#[derive(Clone)]
pub struct TokenAuthLayer {
    header: HeaderName,
    store: Arc<TokenStore>,
    source: Arc<dyn TokenSource>,
}

impl TokenAuthLayer {
    pub fn new(header: HeaderName, store: Arc<TokenStore>, source: Arc<dyn TokenSource>) -> Self {
        Self {
            header,
            store,
            source,
        }
    }
}

impl<S> Layer<S> for TokenAuthLayer {
    type Service = TokenAuth<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TokenAuth {
            inner,
            header: self.header.clone(),
            store: self.store.clone(),
            source: self.source.clone(),
        }
    }
}

/// Service produced by [`TokenAuthLayer`].
#[derive(Clone)]
pub struct TokenAuth<S> {
    inner: S,
    header: HeaderName,
    store: Arc<TokenStore>,
    source: Arc<dyn TokenSource>,
}

impl<S> Service<HttpRequest> for TokenAuth<S>
where
    S: Service<HttpRequest, Response = HttpResponse, Error = TransportError> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = HttpResponse;
    type Error = TransportError;
    type Future = BoxFuture<'static, Result<HttpResponse, TransportError>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: HttpRequest) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let header = self.header.clone();
        let store = self.store.clone();
        let source = self.source.clone();

        Box::pin(async move {
            let token = store.get_or_authenticate(source.as_ref()).await?;
            let value = HeaderValue::from_str(&token)
                .map_err(|_| AuthError::Decode("token is not a valid header value".to_string()))?;
            req.headers_mut().insert(header, value);

            let response = inner.call(req).await?;
            if response.status() == StatusCode::UNAUTHORIZED && store.clear_if(&token).await {
                tracing::warn!("Upstream rejected token, re-authenticating on next call");
            }
            Ok::<_, TransportError>(response)
        })
    }
}

/// Layer for upstreams that hand out a session id on demand.
///
/// The upstream answers 409 Conflict with the id in `header` whenever the
/// request carries none or a stale one. The id is kept in the store and the
/// request is replayed once with it.
#[derive(Clone)]
pub struct SessionIdLayer {
    header: HeaderName,
    store: Arc<TokenStore>,
}

impl SessionIdLayer {
    pub fn new(header: HeaderName, store: Arc<TokenStore>) -> Self {
        Self { header, store }
    }
}

impl<S> Layer<S> for SessionIdLayer {
    type Service = SessionId<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SessionId {
            inner,
            header: self.header.clone(),
            store: self.store.clone(),
        }
    }
}

/// Service produced by [`SessionIdLayer`].
#[derive(Clone)]
pub struct SessionId<S> {
    inner: S,
    header: HeaderName,
    store: Arc<TokenStore>,
}

impl<S> Service<HttpRequest> for SessionId<S>
where
    S: Service<HttpRequest, Response = HttpResponse, Error = TransportError> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = HttpResponse;
    type Error = TransportError;
    type Future = BoxFuture<'static, Result<HttpResponse, TransportError>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: HttpRequest) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let mut retry_inner = self.inner.clone();
        let header = self.header.clone();
        let store = self.store.clone();

        Box::pin(async move {
            if let Some(id) = store.token().await {
                let value = HeaderValue::from_str(&id)
                    .map_err(|_| AuthError::Decode("session id is not a valid header value".to_string()))?;
                req.headers_mut().insert(header.clone(), value);
            }
            let mut retry = replay(&req);

            let response = inner.call(req).await?;
            if response.status() != StatusCode::CONFLICT {
                return Ok(response);
            }
            let Some(id) = response.headers().get(&header).cloned() else {
                return Ok(response);
            };
            let fresh = id
                .to_str()
                .map_err(|_| AuthError::Decode("session id is not valid text".to_string()))?;
            tracing::debug!("Obtained new session id");
            store.set_token(fresh).await;

            retry.headers_mut().insert(header, id);
            retry_inner.ready().await?.call(retry).await
        })
    }
}

/// Copy of `req` that can be sent again.
fn replay(req: &HttpRequest) -> HttpRequest {
    let mut copy = http::Request::new(req.body().clone());
    *copy.method_mut() = req.method().clone();
    *copy.uri_mut() = req.uri().clone();
    *copy.version_mut() = req.version();
    *copy.headers_mut() = req.headers().clone();
    copy
}

/// Layer attaching a fixed header, typically an API key.
#[derive(Debug, Clone)]
pub struct ApiKeyLayer {
    header: HeaderName,
    value: HeaderValue,
}

impl ApiKeyLayer {
    pub fn new(header: HeaderName, mut value: HeaderValue) -> Self {
        value.set_sensitive(true);
        Self { header, value }
    }
}

impl<S> Layer<S> for ApiKeyLayer {
    type Service = ApiKey<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ApiKey {
            inner,
            header: self.header.clone(),
            value: self.value.clone(),
        }
    }
}

/// Service produced by [`ApiKeyLayer`].
#[derive(Debug, Clone)]
pub struct ApiKey<S> {
    inner: S,
    header: HeaderName,
    value: HeaderValue,
}

impl<S> Service<HttpRequest> for ApiKey<S>
where
    S: Service<HttpRequest>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: HttpRequest) -> Self::Future {
        req.headers_mut().insert(self.header.clone(), self.value.clone());
        self.inner.call(req)
    }
}
