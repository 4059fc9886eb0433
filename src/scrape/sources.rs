//! [`StatsSource`] adapters over the vendor capability traits.
//!
//! Slow-changing data (Plex library sizes, Prowlarr indexer statistics, VPN
//! connectivity) goes through a [`Snapshot`] so it is not fetched on every
//! scrape.

use std::time::Duration;

use async_trait::async_trait;

use super::{Category, CategoryValue, StatsSource};
use crate::snapshot::Snapshot;
use crate::upstream::{
    ArrApi, IndexerStats, LibraryEntry, PlexApi, ProwlarrApi, TransmissionApi, UpstreamError, UpstreamResult,
    VpnApi,
};

/// Categories of a Sonarr or Radarr scrape.
pub const ARR_CATEGORIES: &[Category] = &[
    Category::Version,
    Category::Health,
    Category::Calendar,
    Category::Queue,
    Category::Library,
];

const PLEX_CATEGORIES: &[Category] = &[
    Category::Version,
    Category::Sessions,
    Category::LibrarySizes,
];

const PROWLARR_CATEGORIES: &[Category] = &[Category::Version, Category::Indexers];

const TRANSMISSION_CATEGORIES: &[Category] = &[Category::Version, Category::Torrents];

const VPN_CATEGORIES: &[Category] = &[Category::Bandwidth, Category::Connectivity];

const VPN_CONNECTIVITY_CATEGORIES: &[Category] = &[Category::Connectivity];

/// Scrapes a Sonarr or Radarr instance.
pub struct ArrSource<C> {
    client: C,
}

impl<C: ArrApi + 'static> ArrSource<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C: ArrApi + 'static> StatsSource for ArrSource<C> {
    fn categories(&self) -> &'static [Category] {
        ARR_CATEGORIES
    }

    async fn fetch(&self, category: Category) -> UpstreamResult<CategoryValue> {
        match category {
            Category::Version => self.client.get_version().await.map(CategoryValue::Version),
            Category::Health => self.client.get_health().await.map(CategoryValue::Health),
            Category::Calendar => self.client.get_calendar().await.map(CategoryValue::Calendar),
            Category::Queue => self.client.get_queue().await.map(CategoryValue::Queue),
            Category::Library => self.client.get_library().await.map(CategoryValue::Library),
            other => Err(UpstreamError::Unsupported(other.as_str())),
        }
    }
}

/// Scrapes a Plex Media Server. Library sizes are memoized for `refresh_interval`.
pub struct PlexSource<C> {
    client: C,
    library_sizes: Snapshot<Vec<LibraryEntry>>,
}

impl<C: PlexApi + 'static> PlexSource<C> {
    pub fn new(client: C, refresh_interval: Duration) -> Self {
        Self {
            client,
            library_sizes: Snapshot::new(refresh_interval),
        }
    }
}

#[async_trait]
impl<C: PlexApi + 'static> StatsSource for PlexSource<C> {
    fn categories(&self) -> &'static [Category] {
        PLEX_CATEGORIES
    }

    async fn fetch(&self, category: Category) -> UpstreamResult<CategoryValue> {
        match category {
            Category::Version => self.client.get_version().await.map(CategoryValue::Version),
            Category::Sessions => self.client.get_sessions().await.map(CategoryValue::Sessions),
            Category::LibrarySizes => self
                .library_sizes
                .measure(|| self.client.get_library_sizes())
                .await
                .map(CategoryValue::LibrarySizes),
            other => Err(UpstreamError::Unsupported(other.as_str())),
        }
    }
}

/// Scrapes a Prowlarr instance. Indexer statistics are memoized for `refresh_interval`.
pub struct ProwlarrSource<C> {
    client: C,
    indexers: Snapshot<IndexerStats>,
}

impl<C: ProwlarrApi + 'static> ProwlarrSource<C> {
    pub fn new(client: C, refresh_interval: Duration) -> Self {
        Self {
            client,
            indexers: Snapshot::new(refresh_interval),
        }
    }
}

#[async_trait]
impl<C: ProwlarrApi + 'static> StatsSource for ProwlarrSource<C> {
    fn categories(&self) -> &'static [Category] {
        PROWLARR_CATEGORIES
    }

    async fn fetch(&self, category: Category) -> UpstreamResult<CategoryValue> {
        match category {
            Category::Version => self.client.get_version().await.map(CategoryValue::Version),
            Category::Indexers => self
                .indexers
                .measure(|| self.client.get_indexer_stats())
                .await
                .map(CategoryValue::Indexers),
            other => Err(UpstreamError::Unsupported(other.as_str())),
        }
    }
}

/// Scrapes a Transmission daemon.
pub struct TransmissionSource<C> {
    client: C,
}

impl<C: TransmissionApi + 'static> TransmissionSource<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C: TransmissionApi + 'static> StatsSource for TransmissionSource<C> {
    fn categories(&self) -> &'static [Category] {
        TRANSMISSION_CATEGORIES
    }

    async fn fetch(&self, category: Category) -> UpstreamResult<CategoryValue> {
        match category {
            Category::Version => self.client.get_version().await.map(CategoryValue::Version),
            Category::Torrents => self.client.get_stats().await.map(CategoryValue::Torrents),
            other => Err(UpstreamError::Unsupported(other.as_str())),
        }
    }
}

/// Monitors an OpenVPN client. Connectivity is memoized for `refresh_interval`.
pub struct OpenVpnSource<C> {
    client: C,
    connectivity: Snapshot<bool>,
}

impl<C: VpnApi + 'static> OpenVpnSource<C> {
    pub fn new(client: C, refresh_interval: Duration) -> Self {
        Self {
            client,
            connectivity: Snapshot::new(refresh_interval),
        }
    }
}

#[async_trait]
impl<C: VpnApi + 'static> StatsSource for OpenVpnSource<C> {
    fn categories(&self) -> &'static [Category] {
        if self.client.has_status_file() {
            VPN_CATEGORIES
        } else {
            VPN_CONNECTIVITY_CATEGORIES
        }
    }

    async fn fetch(&self, category: Category) -> UpstreamResult<CategoryValue> {
        match category {
            Category::Bandwidth => self.client.get_traffic().await.map(CategoryValue::Bandwidth),
            Category::Connectivity => self
                .connectivity
                .measure(|| self.client.is_connected())
                .await
                .map(CategoryValue::Connectivity),
            other => Err(UpstreamError::Unsupported(other.as_str())),
        }
    }
}
