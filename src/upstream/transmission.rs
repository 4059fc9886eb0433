//! Transmission RPC client.
//!
//! Every call is a POST of `{"method": ...}` to the RPC endpoint. The
//! session id handshake is handled by the transport chain
//! (`SessionIdLayer`), so this client only deals with payloads.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::api::ApiClient;
use super::types::{TorrentStats, UpstreamError, UpstreamResult};
use super::TransmissionApi;

/// Header carrying the RPC session id.
pub const SESSION_ID_HEADER: &str = "x-transmission-session-id";

/// RPC endpoint below the server URL.
pub const RPC_PATH: &str = "/transmission/rpc";

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    method: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct RpcResponse<T> {
    result: String,
    #[serde(default)]
    arguments: Option<T>,
}

#[derive(Debug, Deserialize)]
struct SessionArguments {
    version: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SessionStats {
    active_torrent_count: u64,
    paused_torrent_count: u64,
    download_speed: u64,
    upload_speed: u64,
}

/// Client for one Transmission daemon.
#[derive(Clone)]
pub struct TransmissionClient {
    api: ApiClient,
}

impl TransmissionClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    async fn call<T: serde::de::DeserializeOwned>(&self, method: &str) -> UpstreamResult<T> {
        let response: RpcResponse<T> = self.api.post_json(RPC_PATH, &RpcRequest { method }).await?;
        if response.result != "success" {
            return Err(UpstreamError::Rpc {
                method: method.to_string(),
                result: response.result,
            });
        }
        response.arguments.ok_or_else(|| UpstreamError::Rpc {
            method: method.to_string(),
            result: "missing arguments".to_string(),
        })
    }
}

#[async_trait]
impl TransmissionApi for TransmissionClient {
    async fn get_version(&self) -> UpstreamResult<String> {
        let session: SessionArguments = self.call("session-get").await?;
        Ok(session.version)
    }

    async fn get_stats(&self) -> UpstreamResult<TorrentStats> {
        let stats: SessionStats = self.call("session-stats").await?;
        Ok(TorrentStats {
            active: stats.active_torrent_count,
            paused: stats.paused_torrent_count,
            download_speed: stats.download_speed as f64,
            upload_speed: stats.upload_speed as f64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{BoxTransport, HttpRequest, TransportError};
    use bytes::Bytes;

    fn client(reply: fn(&str) -> &'static str) -> TransmissionClient {
        let transport = BoxTransport::new(tower::service_fn(move |req: HttpRequest| {
            let body: serde_json::Value = serde_json::from_slice(req.body()).unwrap();
            let method = body["method"].as_str().unwrap_or_default().to_string();
            assert_eq!(req.uri().path(), RPC_PATH);
            async move {
                Ok::<_, TransportError>(http::Response::new(Bytes::from_static(reply(&method).as_bytes())))
            }
        }));
        TransmissionClient::new(ApiClient::new("http://localhost:9091", transport).unwrap())
    }

    #[tokio::test]
    async fn test_version_and_stats() {
        let client = client(|method| match method {
            "session-get" => r#"{"result": "success", "arguments": {"version": "4.0.5 (a6fe2a64aa)"}}"#,
            _ => {
                r#"{"result": "success", "arguments": {"activeTorrentCount": 2, "pausedTorrentCount": 3,
                    "downloadSpeed": 1000, "uploadSpeed": 200, "torrentCount": 5}}"#
            }
        });

        assert_eq!(client.get_version().await.unwrap(), "4.0.5 (a6fe2a64aa)");
        assert_eq!(
            client.get_stats().await.unwrap(),
            TorrentStats {
                active: 2,
                paused: 3,
                download_speed: 1000.0,
                upload_speed: 200.0,
            }
        );
    }

    #[tokio::test]
    async fn test_failed_result() {
        let client = client(|_| r#"{"result": "no such method"}"#);
        let err = client.get_stats().await.unwrap_err();
        assert!(matches!(
            err,
            UpstreamError::Rpc { ref method, ref result } if method == "session-stats" && result == "no such method"
        ));
    }
}
