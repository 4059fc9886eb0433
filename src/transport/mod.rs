//! Upstream HTTP transport.
//!
//! # Data Flow
//! ```text
//! vendor client
//!     │  http::Request<Bytes>
//!     ▼
//! Instrumented ── latency, errors by (method, normalized path)
//!     ▼
//! ApiKey | TokenAuth | SessionId ── attach credentials
//!     ▼
//! Cached ── replay fresh successful GETs
//!     ▼
//! HttpTransport ── reqwest, per-request timeout
//! ```
//!
//! # Design Decisions
//! - Every stage is a `tower` layer over `Request<Bytes>`/`Response<Bytes>`
//! - Bodies are fully buffered; upstream payloads are small JSON documents
//! - The composed chain is boxed so vendor clients are not generic over it

pub mod auth;
pub mod builder;
pub mod client;
pub mod instrument;
pub mod path;
pub mod types;

pub use auth::{ApiKeyLayer, SessionIdLayer, TokenAuthLayer, TokenSource, TokenStore};
pub use builder::TransportBuilder;
pub use client::HttpTransport;
pub use instrument::{InstrumentLayer, TransportMetrics};
pub use path::PathNormalizer;
pub use types::{AuthError, BoxTransport, HttpRequest, HttpResponse, TransportError};
