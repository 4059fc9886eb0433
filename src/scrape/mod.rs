//! Fan-out scrape orchestration.
//!
//! # Data Flow
//! ```text
//! UpstreamCollector::refresh
//!     → CircuitBreaker::execute (fail fast while open)
//!     → Scraper::scrape
//!         ├─ task: fetch(Version)  ─┐
//!         ├─ task: fetch(Health)   ─┤
//!         ├─ ...                   ─┼─▶ sink (mpsc) ─▶ ScrapeReport
//!         └─ task: fetch(Queue)    ─┘
//!     → Publisher (swap in the samples of successful categories)
//! ```
//!
//! # Design Decisions
//! - Categories are independent: one failing never discards the others
//! - Each category fetch runs in its own task, bounded by the scrape deadline
//! - A scrape with any failed category counts as a breaker failure

pub mod collector;
pub mod gauges;
pub mod orchestrator;
pub mod sources;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;

use crate::upstream::{
    IndexerStats, Library, LibraryEntry, PlexSession, QueuedItem, TorrentStats, UpstreamError, UpstreamResult,
    VpnTraffic,
};

pub use collector::{ScrapeError, UpstreamCollector};
pub use gauges::{ArrGauges, OpenVpnGauges, PlexGauges, ProwlarrGauges, Publisher, TransmissionGauges};
pub use orchestrator::{ScrapeReport, Scraper};
pub use sources::{ArrSource, OpenVpnSource, PlexSource, ProwlarrSource, TransmissionSource};

/// An independently collectable group of statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Version,
    Health,
    Calendar,
    Queue,
    Library,
    Sessions,
    LibrarySizes,
    Indexers,
    Torrents,
    Bandwidth,
    Connectivity,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Version => "version",
            Category::Health => "health",
            Category::Calendar => "calendar",
            Category::Queue => "queue",
            Category::Library => "library",
            Category::Sessions => "sessions",
            Category::LibrarySizes => "library_sizes",
            Category::Indexers => "indexers",
            Category::Torrents => "torrents",
            Category::Bandwidth => "bandwidth",
            Category::Connectivity => "connectivity",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collected value of one category.
#[derive(Debug, Clone, PartialEq)]
pub enum CategoryValue {
    Version(String),
    Health(BTreeMap<String, u64>),
    Calendar(Vec<String>),
    Queue(Vec<QueuedItem>),
    Library(Library),
    Sessions(Vec<PlexSession>),
    LibrarySizes(Vec<LibraryEntry>),
    Indexers(IndexerStats),
    Torrents(TorrentStats),
    Bandwidth(VpnTraffic),
    Connectivity(bool),
}

/// Outcome of one category fetch.
#[derive(Debug)]
pub struct CategoryResult {
    pub category: Category,
    pub outcome: UpstreamResult<CategoryValue>,
}

impl CategoryResult {
    pub fn failed(category: Category, error: UpstreamError) -> Self {
        Self {
            category,
            outcome: Err(error),
        }
    }
}

/// Something a [`Scraper`] can fan out over.
#[async_trait]
pub trait StatsSource: Send + Sync + 'static {
    /// Categories collected on every scrape.
    fn categories(&self) -> &'static [Category];

    /// Collect one category.
    async fn fetch(&self, category: Category) -> UpstreamResult<CategoryValue>;
}
