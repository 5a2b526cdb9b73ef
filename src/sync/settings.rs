//! Sync configuration and interval parsing.
//!
//! The control plane describes cadences as text such as `"every 30 minutes"`
//! or `"every 3 hours"`. Locally they are held as [`Duration`]s and written
//! to the wire as whole minutes.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cadence used when a remote interval cannot be understood.
pub const FALLBACK_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Default location cadence before the first successful fetch.
pub const DEFAULT_LOCATION_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Default biometric cadence before the first successful fetch.
pub const DEFAULT_BIOMETRIC_INTERVAL: Duration = Duration::from_secs(3 * 60 * 60);

/// Default collection endpoint base address.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:3000";

/// Requested location fix precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LocationPrecision {
    #[default]
    Best,
    TenMeters,
    HundredMeters,
    Kilometer,
}

/// Active sync settings.
///
/// Written only by the configuration resolver; read by the scheduler and
/// copied into every record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfiguration {
    #[serde(rename = "locationIntervalMinutes", with = "minutes_serde")]
    pub location_interval: Duration,
    #[serde(rename = "biometricIntervalMinutes", with = "minutes_serde")]
    pub biometric_interval: Duration,
    pub sync_on_app_open: bool,
    pub notifications_enabled: bool,
    #[serde(default)]
    pub location_precision: LocationPrecision,
    pub endpoint: String,
}

impl Default for SyncConfiguration {
    fn default() -> Self {
        Self {
            location_interval: DEFAULT_LOCATION_INTERVAL,
            biometric_interval: DEFAULT_BIOMETRIC_INTERVAL,
            sync_on_app_open: true,
            notifications_enabled: true,
            location_precision: LocationPrecision::Best,
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }
}

impl SyncConfiguration {
    /// Defaults pointed at a specific endpoint.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// The shorter of the two cadences.
    pub fn shortest_interval(&self) -> Duration {
        self.location_interval.min(self.biometric_interval)
    }

    /// Endpoint without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.endpoint.trim_end_matches('/')
    }
}

/// Parse a human-readable interval such as `"every 45 minutes"`.
///
/// Takes the first cardinal number and the unit token after it (`min...`,
/// `hour...`, `hr...`), which may be written together as in `"5min"`. A unit
/// with no number counts as one. Anything else,
/// including a zero interval, falls back to 30 minutes.
pub fn interval_from_text(text: &str) -> Duration {
    parse_interval(text).unwrap_or(FALLBACK_INTERVAL)
}

fn parse_interval(text: &str) -> Option<Duration> {
    let lowered = text.to_lowercase();
    let tokens: Vec<&str> = lowered
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|t| !t.is_empty())
        .flat_map(split_number)
        .collect();

    let mut count: Option<u64> = None;
    for token in tokens {
        if count.is_none() {
            if let Ok(n) = token.parse::<u64>() {
                count = Some(n);
                continue;
            }
        }
        let minutes_per_unit = if token.starts_with("min") {
            1
        } else if token.starts_with("hour") || token.starts_with("hr") {
            60
        } else {
            continue;
        };
        let minutes = count.unwrap_or(1).checked_mul(minutes_per_unit)?;
        if minutes == 0 {
            return None;
        }
        return Some(Duration::from_secs(minutes.checked_mul(60)?));
    }
    None
}

/// Split a leading digit run off a token: `"5min"` becomes `["5", "min"]`.
fn split_number(token: &str) -> Vec<&str> {
    match token.find(|c: char| !c.is_ascii_digit()) {
        Some(at) if at > 0 => vec![&token[..at], &token[at..]],
        _ => vec![token],
    }
}

/// Durations as whole minutes on the wire.
mod minutes_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_secs() / 60).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let minutes = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(minutes * 60))
    }
}
