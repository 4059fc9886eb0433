//! Upstream vendor clients.
//!
//! # Data Flow
//! ```text
//! ArrApi / PlexApi / ProwlarrApi / TransmissionApi / VpnApi (capability traits)
//!     → ArrClient / PlexClient / ... (endpoint knowledge, JSON decoding)
//!     → ApiClient (GET or POST + decode over a BoxTransport)
//!     → transport chain
//! ```
//!
//! # Design Decisions
//! - Capabilities are traits so scrape sources can be exercised with fakes
//! - Clients return domain types, never raw vendor payloads

pub mod api;
pub mod arr;
pub mod openvpn;
pub mod plex;
pub mod prowlarr;
pub mod transmission;
pub mod types;

use std::collections::BTreeMap;

use async_trait::async_trait;

pub use api::ApiClient;
pub use arr::{ArrClient, ArrKind};
pub use openvpn::OpenVpnClient;
pub use plex::{PlexClient, PlexTvTokenSource};
pub use prowlarr::ProwlarrClient;
pub use transmission::TransmissionClient;
pub use types::{
    IndexerEntry, IndexerStats, Library, LibraryEntry, PlexSession, QueuedItem, TorrentStats, Transcoder,
    UpstreamError, UpstreamResult, UserAgentEntry, VpnTraffic,
};

/// Operations shared by Sonarr and Radarr.
#[async_trait]
pub trait ArrApi: Send + Sync {
    async fn get_version(&self) -> UpstreamResult<String>;

    /// Number of health items per type.
    async fn get_health(&self) -> UpstreamResult<BTreeMap<String, u64>>;

    /// Titles of upcoming entries.
    async fn get_calendar(&self) -> UpstreamResult<Vec<String>>;

    async fn get_queue(&self) -> UpstreamResult<Vec<QueuedItem>>;

    async fn get_library(&self) -> UpstreamResult<Library>;
}

/// Operations of a Plex Media Server.
#[async_trait]
pub trait PlexApi: Send + Sync {
    async fn get_version(&self) -> UpstreamResult<String>;

    /// Active playback sessions.
    async fn get_sessions(&self) -> UpstreamResult<Vec<PlexSession>>;

    /// Size on disk of every title, per library.
    async fn get_library_sizes(&self) -> UpstreamResult<Vec<LibraryEntry>>;
}

/// Operations of a Prowlarr instance.
#[async_trait]
pub trait ProwlarrApi: Send + Sync {
    async fn get_version(&self) -> UpstreamResult<String>;

    async fn get_indexer_stats(&self) -> UpstreamResult<IndexerStats>;
}

/// Operations of a Transmission daemon.
#[async_trait]
pub trait TransmissionApi: Send + Sync {
    async fn get_version(&self) -> UpstreamResult<String>;

    async fn get_stats(&self) -> UpstreamResult<TorrentStats>;
}

/// Checks of a VPN client.
#[async_trait]
pub trait VpnApi: Send + Sync {
    /// Whether byte counters can be read.
    fn has_status_file(&self) -> bool;

    async fn get_traffic(&self) -> UpstreamResult<VpnTraffic>;

    /// Whether the internet is reachable through the tunnel.
    async fn is_connected(&self) -> UpstreamResult<bool>;
}
