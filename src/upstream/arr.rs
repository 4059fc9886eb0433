//! Sonarr and Radarr (API v3) client.
//!
//! # Responsibilities
//! - Fetch version, health, calendar, queue and library state
//! - Page through the download queue
//! - Provide the default response cache table per application
//!
//! # Design Decisions
//! - One client for both applications; they share the v3 API shape and only
//!   differ in the library endpoint and how episode titles are built
//! - Authentication (`X-Api-Key`) is attached by the transport chain

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::api::ApiClient;
use super::types::{Library, QueuedItem, UpstreamResult};
use super::ArrApi;
use crate::cache::{CacheRule, CacheTable};

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Records requested per queue page.
pub const QUEUE_PAGE_SIZE: u64 = 100;

/// Default TTL for cached responses.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

/// Which *arr application a client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrKind {
    Sonarr,
    Radarr,
}

impl ArrKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArrKind::Sonarr => "sonarr",
            ArrKind::Radarr => "radarr",
        }
    }

    /// Endpoint listing every library entry.
    pub fn library_path(&self) -> &'static str {
        match self {
            ArrKind::Sonarr => "/api/v3/series",
            ArrKind::Radarr => "/api/v3/movie",
        }
    }

    /// Rules used when no cache table is configured.
    pub fn default_cache_rules(&self) -> Vec<CacheRule> {
        let minute = Duration::from_secs(60);
        vec![
            CacheRule::literal("/api/v3/system/status", minute),
            CacheRule::literal("/api/v3/calendar", minute),
            CacheRule::literal(self.library_path(), Duration::ZERO),
        ]
    }

    pub fn default_cache_table(&self) -> CacheTable {
        CacheTable::new(self.default_cache_rules(), DEFAULT_CACHE_TTL)
    }
}

impl fmt::Display for ArrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct SystemStatus {
    version: String,
}

#[derive(Debug, Deserialize)]
struct HealthItem {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TitleRef {
    title: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct EpisodeRef {
    title: Option<String>,
    episode_number: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct CalendarEntry {
    title: String,
    season_number: Option<u32>,
    episode_number: Option<u32>,
    series: Option<TitleRef>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct QueuePage {
    total_records: u64,
    records: Vec<QueueRecord>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct QueueRecord {
    title: String,
    size: f64,
    sizeleft: f64,
    season_number: Option<u32>,
    series: Option<TitleRef>,
    episode: Option<EpisodeRef>,
}

#[derive(Debug, Deserialize)]
struct LibraryItem {
    #[serde(default)]
    monitored: bool,
}

fn episode_name(series: &str, season: u32, episode: u32, title: &str) -> String {
    format!("{} - S{:02}E{:02} - {}", series, season, episode, title)
}

impl CalendarEntry {
    fn name(&self) -> String {
        match (&self.series, self.season_number, self.episode_number) {
            (Some(series), Some(season), Some(episode)) => {
                episode_name(&series.title, season, episode, &self.title)
            }
            _ => self.title.clone(),
        }
    }
}

impl QueueRecord {
    fn name(&self) -> String {
        match (&self.series, self.season_number, &self.episode) {
            (Some(series), Some(season), Some(episode)) => episode_name(
                &series.title,
                season,
                episode.episode_number,
                episode.title.as_deref().unwrap_or(&self.title),
            ),
            _ => self.title.clone(),
        }
    }

    fn into_item(self) -> QueuedItem {
        QueuedItem {
            title: self.name(),
            total_bytes: self.size,
            downloaded_bytes: (self.size - self.sizeleft).max(0.0),
        }
    }
}

/// Client for one Sonarr or Radarr instance.
#[derive(Clone)]
pub struct ArrClient {
    kind: ArrKind,
    api: ApiClient,
    calendar_days: u32,
}

impl ArrClient {
    pub fn new(kind: ArrKind, api: ApiClient, calendar_days: u32) -> Self {
        Self {
            kind,
            api,
            calendar_days,
        }
    }

    pub fn kind(&self) -> ArrKind {
        self.kind
    }

    fn calendar_query(&self) -> String {
        self.calendar_query_at(Utc::now())
    }

    /// Calendar window starting at midnight UTC of `now`, so the query (and
    /// its cache key) stays the same for the whole day.
    fn calendar_query_at(&self, now: DateTime<Utc>) -> String {
        let start = now.date_naive().and_time(NaiveTime::MIN).and_utc();
        let end = start + chrono::Duration::days(i64::from(self.calendar_days));
        let mut query = format!(
            "/api/v3/calendar?start={}&end={}",
            start.to_rfc3339_opts(SecondsFormat::Secs, true),
            end.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        if self.kind == ArrKind::Sonarr {
            query.push_str("&includeSeries=true");
        }
        query
    }

    fn queue_query(&self, page: u64) -> String {
        let mut query = format!("/api/v3/queue?page={}&pageSize={}", page, QUEUE_PAGE_SIZE);
        if self.kind == ArrKind::Sonarr {
            query.push_str("&includeSeries=true&includeEpisode=true");
        }
        query
    }
}

#[async_trait]
impl ArrApi for ArrClient {
    async fn get_version(&self) -> UpstreamResult<String> {
        let status: SystemStatus = self.api.get_json("/api/v3/system/status").await?;
        Ok(status.version)
    }

    async fn get_health(&self) -> UpstreamResult<BTreeMap<String, u64>> {
        let items: Vec<HealthItem> = self.api.get_json("/api/v3/health").await?;
        let mut health = BTreeMap::new();
        for item in items {
            *health.entry(item.kind).or_insert(0) += 1;
        }
        Ok(health)
    }

    async fn get_calendar(&self) -> UpstreamResult<Vec<String>> {
        let entries: Vec<CalendarEntry> = self.api.get_json(&self.calendar_query()).await?;
        Ok(entries.iter().map(CalendarEntry::name).collect())
    }

    async fn get_queue(&self) -> UpstreamResult<Vec<QueuedItem>> {
        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let response: QueuePage = self.api.get_json(&self.queue_query(page)).await?;
            let received = response.records.len();
            items.extend(response.records.into_iter().map(QueueRecord::into_item));
            if received == 0 || items.len() as u64 >= response.total_records {
                break;
            }
            page += 1;
        }
        Ok(items)
    }

    async fn get_library(&self) -> UpstreamResult<Library> {
        let entries: Vec<LibraryItem> = self.api.get_json(self.kind.library_path()).await?;
        let mut library = Library::default();
        for entry in entries {
            if entry.monitored {
                library.monitored += 1;
            } else {
                library.unmonitored += 1;
            }
        }
        Ok(library)
    }
}
