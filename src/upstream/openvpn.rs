//! OpenVPN client checks.
//!
//! # Responsibilities
//! - Read the byte counters from an OpenVPN client status file
//! - Check connectivity through the tunnel with a `204 No Content` endpoint
//!
//! # Design Decisions
//! - A failed connectivity check reports "down", it is not an error
//! - The status file is optional; without it only connectivity is checked

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use http::StatusCode;

use super::api::ApiClient;
use super::types::{UpstreamError, UpstreamResult, VpnTraffic};
use super::VpnApi;

const READ_BYTES: &str = "TCP/UDP read bytes";
const WRITE_BYTES: &str = "TCP/UDP write bytes";

/// Parse the `OpenVPN STATISTICS` section of a client status file.
pub fn parse_status(path: &Path, contents: &str) -> UpstreamResult<VpnTraffic> {
    let invalid = |message: String| UpstreamError::StatusFile {
        path: path.display().to_string(),
        message,
    };

    let mut values = HashMap::new();
    for line in contents.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if line == "OpenVPN STATISTICS" || line == "END" {
            continue;
        }
        let (key, value) = line
            .split_once(',')
            .ok_or_else(|| invalid(format!("invalid line '{line}'")))?;
        if key == "Updated" {
            continue;
        }
        let value: u64 = value
            .parse()
            .map_err(|e| invalid(format!("invalid value '{value}': {e}")))?;
        values.insert(key, value);
    }

    let counter = |key: &str| {
        values
            .get(key)
            .copied()
            .ok_or_else(|| invalid(format!("{key} not found")))
    };
    Ok(VpnTraffic {
        read_bytes: counter(READ_BYTES)?,
        written_bytes: counter(WRITE_BYTES)?,
    })
}

/// Checks one OpenVPN client.
#[derive(Clone)]
pub struct OpenVpnClient {
    status_file: Option<PathBuf>,
    connectivity: ApiClient,
}

impl OpenVpnClient {
    /// `connectivity` targets an endpoint answering `204 No Content`.
    pub fn new(status_file: Option<PathBuf>, connectivity: ApiClient) -> Self {
        Self { status_file, connectivity }
    }
}

#[async_trait]
impl VpnApi for OpenVpnClient {
    fn has_status_file(&self) -> bool {
        self.status_file.is_some()
    }

    async fn get_traffic(&self) -> UpstreamResult<VpnTraffic> {
        let path = self
            .status_file
            .as_deref()
            .ok_or(UpstreamError::Unsupported("bandwidth"))?;
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| UpstreamError::StatusFile {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        parse_status(path, &contents)
    }

    async fn is_connected(&self) -> UpstreamResult<bool> {
        match self.connectivity.get_status("").await {
            Ok(status) => Ok(status == StatusCode::NO_CONTENT),
            Err(e) => {
                tracing::debug!(error = %e, "Connectivity check failed");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{BoxTransport, HttpRequest, TransportError};
    use bytes::Bytes;
    use std::io::Write;

    const STATUS: &str = "OpenVPN STATISTICS
Updated,2026-03-01 10:00:00
TUN/TAP read bytes,3
TUN/TAP write bytes,4
TCP/UDP read bytes,1024
TCP/UDP write bytes,2048
Auth read bytes,5
END
";

    fn checker(status: StatusCode) -> ApiClient {
        let transport = BoxTransport::new(tower::service_fn(move |_req: HttpRequest| async move {
            Ok::<_, TransportError>(
                http::Response::builder()
                    .status(status)
                    .body(Bytes::new())
                    .unwrap(),
            )
        }));
        ApiClient::new("http://clients3.example.com/generate_204", transport).unwrap()
    }

    #[test]
    fn test_parse_status() {
        let traffic = parse_status(Path::new("status"), STATUS).unwrap();
        assert_eq!(
            traffic,
            VpnTraffic {
                read_bytes: 1024,
                written_bytes: 2048,
            }
        );
    }

    #[test]
    fn test_parse_status_errors() {
        let err = parse_status(Path::new("status"), "OpenVPN STATISTICS\nTCP/UDP read bytes,1\n").unwrap_err();
        assert!(err.to_string().contains("TCP/UDP write bytes not found"), "{err}");

        let err = parse_status(Path::new("status"), "garbage\n").unwrap_err();
        assert!(matches!(err, UpstreamError::StatusFile { .. }));

        let err = parse_status(Path::new("status"), "TCP/UDP read bytes,abc\n").unwrap_err();
        assert!(err.to_string().contains("invalid value"), "{err}");
    }

    #[tokio::test]
    async fn test_reads_status_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(STATUS.as_bytes()).unwrap();

        let client = OpenVpnClient::new(Some(file.path().to_path_buf()), checker(StatusCode::NO_CONTENT));
        assert!(client.has_status_file());
        assert_eq!(client.get_traffic().await.unwrap().read_bytes, 1024);
        assert!(client.is_connected().await.unwrap());
    }

    #[tokio::test]
    async fn test_unexpected_status_is_down() {
        let client = OpenVpnClient::new(None, checker(StatusCode::OK));
        assert!(!client.has_status_file());
        assert!(!client.is_connected().await.unwrap());
        assert!(matches!(
            client.get_traffic().await,
            Err(UpstreamError::Unsupported("bandwidth"))
        ));
    }
}
