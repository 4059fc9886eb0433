//! Prowlarr (API v1) client.

use async_trait::async_trait;
use serde::Deserialize;

use super::api::ApiClient;
use super::types::{IndexerEntry, IndexerStats, UpstreamResult, UserAgentEntry};
use super::ProwlarrApi;

#[derive(Debug, Deserialize)]
struct SystemStatus {
    version: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct IndexerStatsResource {
    indexers: Vec<IndexerStatistics>,
    user_agents: Vec<UserAgentStatistics>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct IndexerStatistics {
    indexer_name: String,
    /// Milliseconds.
    average_response_time: u64,
    number_of_queries: u64,
    number_of_grabs: u64,
    number_of_failed_queries: u64,
    number_of_failed_grabs: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct UserAgentStatistics {
    user_agent: String,
    number_of_queries: u64,
    number_of_grabs: u64,
}

/// Client for one Prowlarr instance. The API key is attached by the transport.
#[derive(Clone)]
pub struct ProwlarrClient {
    api: ApiClient,
}

impl ProwlarrClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ProwlarrApi for ProwlarrClient {
    async fn get_version(&self) -> UpstreamResult<String> {
        let status: SystemStatus = self.api.get_json("/api/v1/system/status").await?;
        Ok(status.version)
    }

    async fn get_indexer_stats(&self) -> UpstreamResult<IndexerStats> {
        let stats: IndexerStatsResource = self.api.get_json("/api/v1/indexerstats").await?;
        Ok(IndexerStats {
            indexers: stats
                .indexers
                .into_iter()
                .map(|indexer| IndexerEntry {
                    name: indexer.indexer_name,
                    average_response_secs: indexer.average_response_time as f64 / 1000.0,
                    queries: indexer.number_of_queries,
                    grabs: indexer.number_of_grabs,
                    failed_queries: indexer.number_of_failed_queries,
                    failed_grabs: indexer.number_of_failed_grabs,
                })
                .collect(),
            user_agents: stats
                .user_agents
                .into_iter()
                .map(|agent| UserAgentEntry {
                    agent: agent.user_agent,
                    queries: agent.number_of_queries,
                    grabs: agent.number_of_grabs,
                })
                .collect(),
        })
    }
}
