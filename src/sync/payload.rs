//! Wire records and the payload builder.
//!
//! The collection endpoint expects a flat JSON object: the location fix,
//! any biometric metrics, and the device metadata all sit at the top level
//! next to `userId` and `timestamp`. Only the settings copy is nested.

use crate::collector::{BiometricReadings, BiometricSnapshot, LocationFix, LocationSnapshot};
use crate::sync::settings::SyncConfiguration;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata describing the device that produced a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub device_model: String,
    pub os_version: String,
    pub app_version: String,
    pub is_simulator: bool,
}

impl DeviceInfo {
    /// Describe the host this agent runs on.
    pub fn current(is_simulator: bool) -> Self {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        Self {
            device_model: format!("{}-{}", hostname, std::env::consts::ARCH),
            os_version: std::env::consts::OS.to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            is_simulator,
        }
    }
}

/// One upload. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRecord {
    user_id: String,
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    location: LocationFix,
    #[serde(flatten)]
    biometrics: BiometricReadings,
    #[serde(flatten)]
    device: DeviceInfo,
    settings: SyncConfiguration,
}

impl SyncRecord {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn location(&self) -> &LocationFix {
        &self.location
    }

    pub fn biometrics(&self) -> &BiometricReadings {
        &self.biometrics
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    pub fn settings(&self) -> &SyncConfiguration {
        &self.settings
    }

    /// True when the record carries at least one biometric metric.
    pub fn has_biometrics(&self) -> bool {
        !self.biometrics.is_empty()
    }
}

/// Compose a record from a collector pass. Pure; no I/O.
///
/// `biometrics` is `None` when the pass did not collect them, and the record
/// then carries no biometric fields at all.
pub fn build(
    principal: &str,
    location: &LocationSnapshot,
    biometrics: Option<&BiometricSnapshot>,
    device: &DeviceInfo,
    settings: &SyncConfiguration,
) -> SyncRecord {
    SyncRecord {
        user_id: principal.to_string(),
        timestamp: Utc::now(),
        location: location.fix,
        biometrics: biometrics.map(|b| b.readings.clone()).unwrap_or_default(),
        device: device.clone(),
        settings: settings.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn device() -> DeviceInfo {
        DeviceInfo {
            device_model: "test-model".into(),
            os_version: "1.0".into(),
            app_version: "0.1.0".into(),
            is_simulator: true,
        }
    }

    #[test]
    fn test_location_only_record_is_flat() {
        let settings = SyncConfiguration {
            location_interval: Duration::from_secs(5 * 60),
            biometric_interval: Duration::from_secs(180 * 60),
            ..SyncConfiguration::default()
        };
        let location = LocationSnapshot::new(37.0, -122.0, 5.0, 0.0, 0.0);
        let record = build("u1", &location, None, &device(), &settings);

        let json = serde_json::to_value(&record).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj["userId"], "u1");
        assert_eq!(obj["latitude"], 37.0);
        assert_eq!(obj["longitude"], -122.0);
        assert_eq!(obj["accuracy"], 5.0);
        assert_eq!(obj["deviceModel"], "test-model");
        assert_eq!(obj["isSimulator"], true);
        assert_eq!(obj["settings"]["locationIntervalMinutes"], 5);
        assert_eq!(obj["settings"]["biometricIntervalMinutes"], 180);
        assert!(obj.contains_key("timestamp"));

        for field in [
            "steps",
            "heartRate",
            "restingHeartRate",
            "heartRateVariability",
            "bloodPressureSystolic",
            "bloodPressureDiastolic",
            "bloodOxygen",
            "activeEnergy",
            "distance",
            "flightsClimbed",
            "sleepDuration",
            "workoutDuration",
            "workoutType",
            "workoutCalories",
        ] {
            assert!(!obj.contains_key(field), "unexpected field {field}");
        }
        assert!(!record.has_biometrics());
    }

    #[test]
    fn test_biometrics_flattened_to_top_level() {
        let bio = BiometricSnapshot::new(BiometricReadings {
            steps: Some(8000),
            heart_rate_variability: Some(42.5),
            workout_type: Some("running".into()),
            ..Default::default()
        });
        let record = build(
            "u2",
            &LocationSnapshot::neutral(),
            Some(&bio),
            &device(),
            &SyncConfiguration::default(),
        );

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["steps"], 8000);
        assert_eq!(json["heartRateVariability"], 42.5);
        assert_eq!(json["workoutType"], "running");
        assert_eq!(json["latitude"], 0.0);
        assert!(json.get("biometrics").is_none());
        assert!(json.get("location").is_none());
        assert!(record.has_biometrics());
    }

    #[test]
    fn test_all_null_biometrics_still_builds() {
        let record = build(
            "u3",
            &LocationSnapshot::neutral(),
            Some(&BiometricSnapshot::empty()),
            &device(),
            &SyncConfiguration::default(),
        );
        assert!(!record.has_biometrics());
        let json = serde_json::to_string(&record).unwrap();
        let back: SyncRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
