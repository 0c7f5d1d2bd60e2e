//! HTTP transport to the TPMS controller
//!
//! The controller exposes two endpoints:
//! - `GET  http://{address}/data`    - current readings as JSON
//! - `POST http://{address}/command` - JSON command, plain-text reply
//!
//! `DeviceTransport` is the seam the session polls through, so tests can
//! swap in an in-memory device.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::device::types::{Command, TelemetryPayload};

/// Readings endpoint path
pub const DATA_PATH: &str = "data";
/// Command endpoint path
pub const COMMAND_PATH: &str = "command";

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Build `http://{address}/{path}`.
///
/// The address is used as given (hostname, IP literal or `host:port`).
pub fn endpoint_url(address: &str, path: &str) -> String {
    format!("http://{}/{}", address, path)
}

/// Every way talking to the controller can fail.
///
/// The session treats all of these the same way: log, publish, carry on.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection refused, DNS failure, timeout, ...
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("device returned HTTP {status}")]
    Status { status: u16 },

    /// Body was not JSON
    #[error("invalid response body: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        TransportError::Decode(e.to_string())
    }
}

/// Host HTTP capability used by `DeviceSession`
#[async_trait]
pub trait DeviceTransport: Send + Sync + 'static {
    /// Fetch and decode the readings endpoint
    async fn fetch_readings(&self, address: &str) -> Result<TelemetryPayload, TransportError>;

    /// Post a command, returning the controller's reply text
    async fn send_command(&self, address: &str, command: &Command)
        -> Result<String, TransportError>;
}

/// reqwest-backed transport
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(request_timeout: Duration) -> Self {
        #[allow(clippy::expect_used)] // HTTP client creation only fails if TLS setup fails
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }
}

#[async_trait]
impl DeviceTransport for HttpTransport {
    async fn fetch_readings(&self, address: &str) -> Result<TelemetryPayload, TransportError> {
        let url = endpoint_url(address, DATA_PATH);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let value: serde_json::Value = serde_json::from_str(&body)?;

        debug!(url = %url, bytes = body.len(), "TPMS data response");

        Ok(TelemetryPayload::from_json(&value))
    }

    async fn send_command(
        &self,
        address: &str,
        command: &Command,
    ) -> Result<String, TransportError> {
        let url = endpoint_url(address, COMMAND_PATH);

        debug!(url = %url, wheel = %command.wheel, action = %command.action, "TPMS command request");

        // .json() sets Content-Type: application/json
        let response = self.client.post(&url).json(command).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
            });
        }

        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url() {
        assert_eq!(
            endpoint_url("192.168.1.50", DATA_PATH),
            "http://192.168.1.50/data"
        );
        assert_eq!(
            endpoint_url("tpms.local:8080", COMMAND_PATH),
            "http://tpms.local:8080/command"
        );
    }

    #[test]
    fn test_decode_error_from_serde() {
        let err = serde_json::from_str::<serde_json::Value>("<html>").unwrap_err();
        let err: TransportError = err.into();
        assert!(matches!(err, TransportError::Decode(_)));
        assert!(err.to_string().starts_with("invalid response body"));
    }

    #[test]
    fn test_status_error_message() {
        let err = TransportError::Status { status: 503 };
        assert_eq!(err.to_string(), "device returned HTTP 503");
    }

    #[tokio::test]
    async fn test_unreachable_device_is_request_error() {
        // Port 9 (discard) on loopback is closed in CI containers
        let transport = HttpTransport::new(Duration::from_millis(500));
        let result = transport.fetch_readings("127.0.0.1:9").await;
        assert!(matches!(result, Err(TransportError::Request(_))));
    }
}
