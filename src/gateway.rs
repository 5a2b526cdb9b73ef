//! HTTP client for the collection endpoint and its control plane.
//!
//! Two routes are used:
//! - `GET {endpoint}/status?userId=...` returns the remote sync configuration
//! - `POST {endpoint}/location` accepts records and settings updates

use crate::sync::payload::SyncRecord;
use crate::sync::settings::SyncConfiguration;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Default request timeout for uploads and config fetches.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Gateway client error types.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Client could not be constructed
    #[error("Gateway config error: {0}")]
    Config(String),
    /// The request did not finish within the timeout
    #[error("Request timed out")]
    Timeout,
    /// Connection, DNS, TLS or body transfer failure
    #[error("Network error: {0}")]
    Network(String),
    /// Server answered with something other than 200
    #[error("Server error: {status}")]
    Server { status: u16, message: String },
    /// Response body could not be decoded
    #[error("Gateway serialization error: {0}")]
    Serialization(String),
}

impl GatewayError {
    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GatewayError::Timeout
        } else {
            GatewayError::Network(e.to_string())
        }
    }

    /// HTTP status if the server answered.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            GatewayError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Response of `GET /status`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[serde(default, alias = "sync_config")]
    pub sync_config: Option<RemoteSyncConfig>,
}

/// The `syncConfig` object as the control plane sends it.
///
/// Intervals are human-readable text; every field is optional so that a
/// partial object only overrides what it carries.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteSyncConfig {
    #[serde(
        default,
        alias = "locationInterval",
        alias = "location_poll_interval"
    )]
    pub location_interval: Option<serde_json::Value>,
    #[serde(
        default,
        alias = "biometricInterval",
        alias = "healthkit_interval",
        alias = "health_interval"
    )]
    pub biometric_interval: Option<serde_json::Value>,
    #[serde(default, alias = "syncOnAppOpen")]
    pub sync_on_app_open: Option<bool>,
    #[serde(default, alias = "notificationsEnabled")]
    pub notifications_enabled: Option<bool>,
    #[serde(default, alias = "locationPrecision")]
    pub location_precision: Option<String>,
}

/// Settings pushed back to the control plane after a local edit.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdate<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub user_id: &'a str,
    pub timestamp: chrono::DateTime<Utc>,
    pub settings: &'a SyncConfiguration,
}

impl<'a> ConfigUpdate<'a> {
    pub fn new(user_id: &'a str, settings: &'a SyncConfiguration) -> Self {
        Self {
            kind: "config_update",
            user_id,
            timestamp: Utc::now(),
            settings,
        }
    }
}

/// Client for the collection endpoint.
///
/// The endpoint address is passed per call because the active configuration
/// may move it at any time.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl GatewayClient {
    /// Create a new gateway client with a per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("synheart-sync-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetch the remote status document for a principal.
    pub async fn fetch_status(
        &self,
        endpoint: &str,
        user_id: &str,
    ) -> Result<StatusResponse, GatewayError> {
        let response = self
            .client
            .get(status_url(endpoint))
            .query(&[("userId", user_id)])
            .send()
            .await
            .map_err(GatewayError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GatewayError::Server {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| GatewayError::Serialization(e.to_string()))
    }

    /// Upload one record. Only HTTP 200 counts as accepted.
    pub async fn post_record(&self, endpoint: &str, record: &SyncRecord) -> Result<(), GatewayError> {
        self.post_json(endpoint, record).await
    }

    /// Push locally edited settings to the control plane.
    pub async fn push_config_update(
        &self,
        endpoint: &str,
        update: &ConfigUpdate<'_>,
    ) -> Result<(), GatewayError> {
        self.post_json(endpoint, update).await
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &T,
    ) -> Result<(), GatewayError> {
        let response = self
            .client
            .post(location_url(endpoint))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(GatewayError::from_reqwest)?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GatewayError::Server {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

/// `GET` route for the remote configuration.
pub fn status_url(endpoint: &str) -> String {
    format!("{}/status", endpoint.trim_end_matches('/'))
}

/// `POST` route for records and settings updates.
pub fn location_url(endpoint: &str) -> String {
    format!("{}/location", endpoint.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_urls() {
        assert_eq!(status_url("http://127.0.0.1:8080"), "http://127.0.0.1:8080/status");
        assert_eq!(
            location_url("http://127.0.0.1:8080/"),
            "http://127.0.0.1:8080/location"
        );
    }

    #[test]
    fn test_server_error_display() {
        let err = GatewayError::Server {
            status: 500,
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "Server error: 500");
        assert_eq!(err.status_code(), Some(500));
        assert_eq!(GatewayError::Timeout.status_code(), None);
    }

    #[test]
    fn test_status_response_aliases() {
        let body = r#"{
            "syncConfig": {
                "locationInterval": "every 5 minutes",
                "healthkit_interval": "every 3 hours",
                "sync_on_app_open": false,
                "notifications_enabled": true
            },
            "lastSeen": "2024-01-01T00:00:00Z"
        }"#;
        let parsed: StatusResponse = serde_json::from_str(body).unwrap();
        let config = parsed.sync_config.unwrap();
        assert_eq!(config.location_interval.unwrap(), "every 5 minutes");
        assert_eq!(config.biometric_interval.unwrap(), "every 3 hours");
        assert_eq!(config.sync_on_app_open, Some(false));
        assert!(config.location_precision.is_none());
    }

    #[test]
    fn test_config_update_body() {
        let settings = SyncConfiguration::default();
        let update = ConfigUpdate::new("u1", &settings);
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["type"], "config_update");
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["settings"]["locationIntervalMinutes"], 5);
    }
}
