//! Gauges published from scrape results.
//!
//! # Responsibilities
//! - Register the per-upstream metric families
//! - Translate category values into samples
//! - Drop every sample of an upstream on reset
//!
//! # Design Decisions
//! - Vectors are reset before each publish so titles that left the calendar
//!   or queue disappear from the exposition
//! - Single-valued gauges are label-less vectors ([`Scalar`]) so a reset
//!   removes the series instead of exposing a zero

use prometheus::GaugeVec;

use super::CategoryValue;
use crate::observability::metrics::{MetricsRegistry, UpstreamLabels};
use crate::upstream::PlexSession;

/// Publishes scrape results for one upstream.
pub trait Publisher: Send + Sync {
    /// Remove all samples.
    fn reset(&self);

    /// Publish one category value.
    fn publish(&self, value: &CategoryValue);
}

/// A single-valued gauge that is absent until set.
#[derive(Clone)]
struct Scalar(GaugeVec);

impl Scalar {
    fn set(&self, value: f64) {
        self.0.with_label_values(&[]).set(value);
    }

    fn reset(&self) {
        self.0.reset();
    }
}

fn gauge(
    registry: &MetricsRegistry,
    subsystem: &str,
    name: &str,
    help: &str,
    labels: &UpstreamLabels,
) -> Result<Scalar, prometheus::Error> {
    gauge_vec(registry, subsystem, name, help, labels, &[]).map(Scalar)
}

fn gauge_vec(
    registry: &MetricsRegistry,
    subsystem: &str,
    name: &str,
    help: &str,
    labels: &UpstreamLabels,
    label_names: &[&str],
) -> Result<GaugeVec, prometheus::Error> {
    let vec = GaugeVec::new(registry.opts(subsystem, name, help, labels), label_names)?;
    registry.register(vec.clone())?;
    Ok(vec)
}

/// Gauges of a Sonarr or Radarr upstream.
#[derive(Clone)]
pub struct ArrGauges {
    version: GaugeVec,
    health: GaugeVec,
    calendar: GaugeVec,
    queued_count: Scalar,
    queued_total: GaugeVec,
    queued_downloaded: GaugeVec,
    monitored: Scalar,
    unmonitored: Scalar,
}

impl ArrGauges {
    pub const SUBSYSTEM: &'static str = "xxxarr";

    pub fn new(registry: &MetricsRegistry, labels: &UpstreamLabels) -> Result<Self, prometheus::Error> {
        let s = Self::SUBSYSTEM;
        Ok(Self {
            version: gauge_vec(registry, s, "version", "Version info", labels, &["version"])?,
            health: gauge_vec(registry, s, "health", "Server health", labels, &["type"])?,
            calendar: gauge_vec(registry, s, "calendar", "Upcoming episodes/movies", labels, &["title"])?,
            queued_count: gauge(registry, s, "queued_count", "Episodes/movies being downloaded", labels)?,
            queued_total: gauge_vec(
                registry,
                s,
                "queued_total_bytes",
                "Size of episode/movie being downloaded in bytes",
                labels,
                &["title"],
            )?,
            queued_downloaded: gauge_vec(
                registry,
                s,
                "queued_downloaded_bytes",
                "Downloaded size of episode/movie being downloaded in bytes",
                labels,
                &["title"],
            )?,
            monitored: gauge(registry, s, "monitored_count", "Number of monitored series/movies", labels)?,
            unmonitored: gauge(
                registry,
                s,
                "unmonitored_count",
                "Number of unmonitored series/movies",
                labels,
            )?,
        })
    }
}

impl Publisher for ArrGauges {
    fn reset(&self) {
        self.version.reset();
        self.health.reset();
        self.calendar.reset();
        self.queued_count.reset();
        self.queued_total.reset();
        self.queued_downloaded.reset();
        self.monitored.reset();
        self.unmonitored.reset();
    }

    fn publish(&self, value: &CategoryValue) {
        match value {
            CategoryValue::Version(version) => self.version.with_label_values(&[version.as_str()]).set(1.0),
            CategoryValue::Health(health) => {
                for (kind, count) in health {
                    self.health.with_label_values(&[kind.as_str()]).set(*count as f64);
                }
            }
            CategoryValue::Calendar(titles) => {
                for title in titles {
                    self.calendar.with_label_values(&[title.as_str()]).set(1.0);
                }
            }
            CategoryValue::Queue(items) => {
                self.queued_count.set(items.len() as f64);
                for item in items {
                    self.queued_total.with_label_values(&[item.title.as_str()]).set(item.total_bytes);
                    self.queued_downloaded
                        .with_label_values(&[item.title.as_str()])
                        .set(item.downloaded_bytes);
                }
            }
            CategoryValue::Library(library) => {
                self.monitored.set(library.monitored as f64);
                self.unmonitored.set(library.unmonitored as f64);
            }
            other => tracing::debug!(value = ?other, "Ignoring category value"),
        }
    }
}

const SESSION_LABELS: &[&str] = &[
    "user",
    "player",
    "title",
    "mode",
    "location",
    "address",
    "video_codec",
    "audio_codec",
];

/// Gauges of a Plex upstream.
#[derive(Clone)]
pub struct PlexGauges {
    version: GaugeVec,
    sessions: GaugeVec,
    session_bandwidth: GaugeVec,
    transcoders: GaugeVec,
    transcoder_speed: Scalar,
    library_bytes: GaugeVec,
}

impl PlexGauges {
    pub const SUBSYSTEM: &'static str = "plex";

    pub fn new(registry: &MetricsRegistry, labels: &UpstreamLabels) -> Result<Self, prometheus::Error> {
        let s = Self::SUBSYSTEM;
        Ok(Self {
            version: gauge_vec(registry, s, "version", "Version info", labels, &["version"])?,
            sessions: gauge_vec(
                registry,
                s,
                "session_count",
                "Active Plex sessions, valued by playback progress",
                labels,
                SESSION_LABELS,
            )?,
            session_bandwidth: gauge_vec(
                registry,
                s,
                "session_bandwidth",
                "Bandwidth of a Plex session in kbps",
                labels,
                SESSION_LABELS,
            )?,
            transcoders: gauge_vec(
                registry,
                s,
                "transcoder_count",
                "Number of active transcoders",
                labels,
                &["state"],
            )?,
            transcoder_speed: gauge(
                registry,
                s,
                "transcoder_speed",
                "Average speed of the active transcoders",
                labels,
            )?,
            library_bytes: gauge_vec(
                registry,
                s,
                "library_bytes",
                "Library entry size in bytes",
                labels,
                &["library", "title"],
            )?,
        })
    }

    fn publish_sessions(&self, sessions: &[PlexSession]) {
        let mut transcoding = 0u32;
        let mut throttled = 0u32;
        let mut speed = 0.0;
        for session in sessions {
            let labels = [
                session.user.as_str(),
                session.player.as_str(),
                session.title.as_str(),
                session.mode.as_str(),
                session.location.as_str(),
                session.address.as_str(),
                session.video_codec.as_str(),
                session.audio_codec.as_str(),
            ];
            self.sessions.with_label_values(&labels).set(session.progress);
            self.session_bandwidth.with_label_values(&labels).set(session.bandwidth);

            if let Some(transcoder) = &session.transcoder {
                if transcoder.throttled {
                    throttled += 1;
                } else {
                    transcoding += 1;
                }
                speed += transcoder.speed;
            }
        }

        let active = transcoding + throttled;
        if active > 0 {
            self.transcoders.with_label_values(&["transcoding"]).set(f64::from(transcoding));
            self.transcoders.with_label_values(&["throttled"]).set(f64::from(throttled));
            self.transcoder_speed.set(speed / f64::from(active));
        }
    }
}

impl Publisher for PlexGauges {
    fn reset(&self) {
        self.version.reset();
        self.sessions.reset();
        self.session_bandwidth.reset();
        self.transcoders.reset();
        self.transcoder_speed.reset();
        self.library_bytes.reset();
    }

    fn publish(&self, value: &CategoryValue) {
        match value {
            CategoryValue::Version(version) => self.version.with_label_values(&[version.as_str()]).set(1.0),
            CategoryValue::Sessions(sessions) => self.publish_sessions(sessions),
            CategoryValue::LibrarySizes(entries) => {
                for entry in entries {
                    self.library_bytes
                        .with_label_values(&[entry.library.as_str(), entry.title.as_str()])
                        .set(entry.bytes);
                }
            }
            other => tracing::debug!(value = ?other, "Ignoring category value"),
        }
    }
}

/// Gauges of a Prowlarr upstream.
#[derive(Clone)]
pub struct ProwlarrGauges {
    version: GaugeVec,
    response_time: GaugeVec,
    indexer_queries: GaugeVec,
    indexer_grabs: GaugeVec,
    indexer_failed_queries: GaugeVec,
    indexer_failed_grabs: GaugeVec,
    agent_queries: GaugeVec,
    agent_grabs: GaugeVec,
}

impl ProwlarrGauges {
    pub const SUBSYSTEM: &'static str = "prowlarr";

    pub fn new(registry: &MetricsRegistry, labels: &UpstreamLabels) -> Result<Self, prometheus::Error> {
        let s = Self::SUBSYSTEM;
        let indexer = &["indexer"];
        let agent = &["user_agent"];
        Ok(Self {
            version: gauge_vec(registry, s, "version", "Version info", labels, &["version"])?,
            response_time: gauge_vec(
                registry,
                s,
                "indexer_response_time",
                "Average indexer response time in seconds",
                labels,
                indexer,
            )?,
            indexer_queries: gauge_vec(registry, s, "indexer_query_total", "Queries per indexer", labels, indexer)?,
            indexer_grabs: gauge_vec(registry, s, "indexer_grab_total", "Grabs per indexer", labels, indexer)?,
            indexer_failed_queries: gauge_vec(
                registry,
                s,
                "indexer_failed_query_total",
                "Failed queries per indexer",
                labels,
                indexer,
            )?,
            indexer_failed_grabs: gauge_vec(
                registry,
                s,
                "indexer_failed_grab_total",
                "Failed grabs per indexer",
                labels,
                indexer,
            )?,
            agent_queries: gauge_vec(
                registry,
                s,
                "user_agent_query_total",
                "Queries per client application",
                labels,
                agent,
            )?,
            agent_grabs: gauge_vec(
                registry,
                s,
                "user_agent_grab_total",
                "Grabs per client application",
                labels,
                agent,
            )?,
        })
    }
}

impl Publisher for ProwlarrGauges {
    fn reset(&self) {
        self.version.reset();
        self.response_time.reset();
        self.indexer_queries.reset();
        self.indexer_grabs.reset();
        self.indexer_failed_queries.reset();
        self.indexer_failed_grabs.reset();
        self.agent_queries.reset();
        self.agent_grabs.reset();
    }

    fn publish(&self, value: &CategoryValue) {
        match value {
            CategoryValue::Version(version) => self.version.with_label_values(&[version.as_str()]).set(1.0),
            CategoryValue::Indexers(stats) => {
                for entry in &stats.indexers {
                    let name = [entry.name.as_str()];
                    self.response_time.with_label_values(&name).set(entry.average_response_secs);
                    self.indexer_queries.with_label_values(&name).set(entry.queries as f64);
                    self.indexer_grabs.with_label_values(&name).set(entry.grabs as f64);
                    self.indexer_failed_queries
                        .with_label_values(&name)
                        .set(entry.failed_queries as f64);
                    self.indexer_failed_grabs
                        .with_label_values(&name)
                        .set(entry.failed_grabs as f64);
                }
                for entry in &stats.user_agents {
                    let agent = [entry.agent.as_str()];
                    self.agent_queries.with_label_values(&agent).set(entry.queries as f64);
                    self.agent_grabs.with_label_values(&agent).set(entry.grabs as f64);
                }
            }
            other => tracing::debug!(value = ?other, "Ignoring category value"),
        }
    }
}

/// Gauges of a Transmission upstream.
#[derive(Clone)]
pub struct TransmissionGauges {
    version: GaugeVec,
    active: Scalar,
    paused: Scalar,
    download_speed: Scalar,
    upload_speed: Scalar,
}

impl TransmissionGauges {
    pub const SUBSYSTEM: &'static str = "transmission";

    pub fn new(registry: &MetricsRegistry, labels: &UpstreamLabels) -> Result<Self, prometheus::Error> {
        let s = Self::SUBSYSTEM;
        Ok(Self {
            version: gauge_vec(registry, s, "version", "Version info", labels, &["version"])?,
            active: gauge(registry, s, "active_torrent_count", "Number of active torrents", labels)?,
            paused: gauge(registry, s, "paused_torrent_count", "Number of paused torrents", labels)?,
            download_speed: gauge(registry, s, "download_speed", "Download speed in bytes/s", labels)?,
            upload_speed: gauge(registry, s, "upload_speed", "Upload speed in bytes/s", labels)?,
        })
    }
}

impl Publisher for TransmissionGauges {
    fn reset(&self) {
        self.version.reset();
        self.active.reset();
        self.paused.reset();
        self.download_speed.reset();
        self.upload_speed.reset();
    }

    fn publish(&self, value: &CategoryValue) {
        match value {
            CategoryValue::Version(version) => self.version.with_label_values(&[version.as_str()]).set(1.0),
            CategoryValue::Torrents(stats) => {
                self.active.set(stats.active as f64);
                self.paused.set(stats.paused as f64);
                self.download_speed.set(stats.download_speed);
                self.upload_speed.set(stats.upload_speed);
            }
            other => tracing::debug!(value = ?other, "Ignoring category value"),
        }
    }
}

/// Gauges of an OpenVPN client.
#[derive(Clone)]
pub struct OpenVpnGauges {
    read_bytes: Scalar,
    written_bytes: Scalar,
    status: Scalar,
}

impl OpenVpnGauges {
    pub const SUBSYSTEM: &'static str = "openvpn";

    pub fn new(registry: &MetricsRegistry, labels: &UpstreamLabels) -> Result<Self, prometheus::Error> {
        let s = Self::SUBSYSTEM;
        Ok(Self {
            read_bytes: gauge(
                registry,
                s,
                "client_tcp_udp_read_bytes_total",
                "Bytes read from the VPN transport",
                labels,
            )?,
            written_bytes: gauge(
                registry,
                s,
                "client_tcp_udp_write_bytes_total",
                "Bytes written to the VPN transport",
                labels,
            )?,
            status: gauge(registry, s, "client_status", "1 if the tunnel is connected", labels)?,
        })
    }
}

impl Publisher for OpenVpnGauges {
    fn reset(&self) {
        self.read_bytes.reset();
        self.written_bytes.reset();
        self.status.reset();
    }

    fn publish(&self, value: &CategoryValue) {
        match value {
            CategoryValue::Bandwidth(traffic) => {
                self.read_bytes.set(traffic.read_bytes as f64);
                self.written_bytes.set(traffic.written_bytes as f64);
            }
            CategoryValue::Connectivity(up) => self.status.set(if *up { 1.0 } else { 0.0 }),
            other => tracing::debug!(value = ?other, "Ignoring category value"),
        }
    }
}
