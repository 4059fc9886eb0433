//! Transport boundary types.

use bytes::Bytes;
use http::StatusCode;
use thiserror::Error;
use tower::util::BoxCloneSyncService;

/// Request handed to the transport chain. The URI must be absolute.
pub type HttpRequest = http::Request<Bytes>;

/// Fully buffered response returned by the transport chain.
pub type HttpResponse = http::Response<Bytes>;

/// A composed, clonable transport.
pub type BoxTransport = BoxCloneSyncService<HttpRequest, HttpResponse, TransportError>;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),
}

/// Errors obtaining a token.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("credentials rejected (status {status})")]
    Rejected { status: StatusCode },

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid token response: {0}")]
    Decode(String),
}
