//! Upstream data types and error definitions.

use std::time::Duration;

use http::StatusCode;
use thiserror::Error;

use crate::transport::TransportError;

/// Errors raised while talking to an upstream API.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The transport chain failed (network, timeout, authentication).
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The upstream answered with a non-success status.
    #[error("Unexpected status {status} for {path}")]
    Status { status: StatusCode, path: String },

    /// The response body did not match the expected shape.
    #[error("Invalid response for {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// The request URL could not be built.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The operation did not finish within its deadline.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The task running the operation panicked or was cancelled.
    #[error("Task failed: {0}")]
    TaskFailed(String),

    /// The source does not provide the requested category.
    #[error("Unsupported category: {0}")]
    Unsupported(&'static str),

    /// An RPC call was answered with a failure result.
    #[error("RPC call {method} failed: {result}")]
    Rpc { method: String, result: String },

    /// A local status file could not be read or parsed.
    #[error("Invalid status file {path}: {message}")]
    StatusFile { path: String, message: String },
}

pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// A download in progress.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedItem {
    pub title: String,
    pub total_bytes: f64,
    pub downloaded_bytes: f64,
}

/// Monitored/unmonitored entry counts of an *arr library.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Library {
    pub monitored: u64,
    pub unmonitored: u64,
}

/// Size on disk of one title in a media library.
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryEntry {
    pub library: String,
    pub title: String,
    pub bytes: f64,
}

/// An active Plex playback session.
#[derive(Debug, Clone, PartialEq)]
pub struct PlexSession {
    pub user: String,
    pub player: String,
    pub title: String,
    /// Video decision: `directplay`, `copy` or `transcode`.
    pub mode: String,
    /// `lan` or `wan`.
    pub location: String,
    pub address: String,
    pub video_codec: String,
    pub audio_codec: String,
    /// Played fraction, 0 to 1.
    pub progress: f64,
    /// Bandwidth in kbps.
    pub bandwidth: f64,
    pub transcoder: Option<Transcoder>,
}

/// Transcoder state of a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transcoder {
    pub throttled: bool,
    pub speed: f64,
}

/// Torrent client statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TorrentStats {
    pub active: u64,
    pub paused: u64,
    /// Bytes per second.
    pub download_speed: f64,
    /// Bytes per second.
    pub upload_speed: f64,
}

/// Indexer statistics of a Prowlarr instance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexerStats {
    pub indexers: Vec<IndexerEntry>,
    pub user_agents: Vec<UserAgentEntry>,
}

/// Query and grab totals of one indexer.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexerEntry {
    pub name: String,
    pub average_response_secs: f64,
    pub queries: u64,
    pub grabs: u64,
    pub failed_queries: u64,
    pub failed_grabs: u64,
}

/// Query and grab totals of one client application.
#[derive(Debug, Clone, PartialEq)]
pub struct UserAgentEntry {
    pub agent: String,
    pub queries: u64,
    pub grabs: u64,
}

/// Byte counters of a VPN client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VpnTraffic {
    pub read_bytes: u64,
    pub written_bytes: u64,
}
