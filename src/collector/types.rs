//! Point-in-time snapshot types produced by the data providers.
//!
//! Every biometric metric is independently optional: a provider that has no
//! reading for a metric reports `None`, never an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Biometric metrics without their capture time.
///
/// This is the part of a [`BiometricSnapshot`] that is flattened into the
/// top level of an uploaded record. Absent metrics are omitted on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiometricReadings {
    /// Steps since local midnight
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<u32>,
    /// Most recent heart rate (bpm)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<u32>,
    /// Most recent resting heart rate (bpm)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resting_heart_rate: Option<u32>,
    /// Heart-rate variability, SDNN in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heart_rate_variability: Option<f64>,
    /// Systolic blood pressure (mmHg)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blood_pressure_systolic: Option<u32>,
    /// Diastolic blood pressure (mmHg)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blood_pressure_diastolic: Option<u32>,
    /// Blood oxygen saturation (percent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blood_oxygen: Option<f64>,
    /// Active energy since local midnight (kcal)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_energy: Option<f64>,
    /// Walking and running distance since local midnight (km)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    /// Flights climbed since local midnight
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flights_climbed: Option<u32>,
    /// Total sleep since the previous day (seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleep_duration: Option<f64>,
    /// Most recent workout duration (seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workout_duration: Option<f64>,
    /// Most recent workout type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workout_type: Option<String>,
    /// Most recent workout energy (kcal)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workout_calories: Option<f64>,
}

impl BiometricReadings {
    /// True when no metric carries a value.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Number of metrics that carry a value.
    pub fn present_count(&self) -> usize {
        [
            self.steps.is_some(),
            self.heart_rate.is_some(),
            self.resting_heart_rate.is_some(),
            self.heart_rate_variability.is_some(),
            self.blood_pressure_systolic.is_some(),
            self.blood_pressure_diastolic.is_some(),
            self.blood_oxygen.is_some(),
            self.active_energy.is_some(),
            self.distance.is_some(),
            self.flights_climbed.is_some(),
            self.sleep_duration.is_some(),
            self.workout_duration.is_some(),
            self.workout_type.is_some(),
            self.workout_calories.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }
}

/// A biometric reading taken at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiometricSnapshot {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub readings: BiometricReadings,
}

impl BiometricSnapshot {
    pub fn new(readings: BiometricReadings) -> Self {
        Self {
            timestamp: Utc::now(),
            readings,
        }
    }

    /// A snapshot with every metric absent.
    pub fn empty() -> Self {
        Self::new(BiometricReadings::default())
    }
}

/// Position fields of a location fix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy radius (meters)
    pub accuracy: f64,
    /// Altitude (meters)
    pub altitude: f64,
    /// Ground speed (m/s)
    pub speed: f64,
}

/// A location fix taken at a point in time. Always fully populated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationSnapshot {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub fix: LocationFix,
}

impl LocationSnapshot {
    pub fn new(latitude: f64, longitude: f64, accuracy: f64, altitude: f64, speed: f64) -> Self {
        Self {
            timestamp: Utc::now(),
            fix: LocationFix {
                latitude,
                longitude,
                accuracy,
                altitude,
                speed,
            },
        }
    }

    /// Zero-coordinate stand-in used before the first real fix.
    pub fn neutral() -> Self {
        Self {
            timestamp: Utc::now(),
            fix: LocationFix::default(),
        }
    }
}

/// Outcome of a one-shot authorization request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Authorization {
    Granted,
    Denied,
    /// The platform has no such data source.
    Unavailable,
}

impl std::fmt::Display for Authorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Authorization::Granted => write!(f, "granted"),
            Authorization::Denied => write!(f, "denied"),
            Authorization::Unavailable => write!(f, "unavailable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_readings() {
        let readings = BiometricReadings::default();
        assert!(readings.is_empty());
        assert_eq!(readings.present_count(), 0);

        let partial = BiometricReadings {
            steps: Some(1200),
            blood_oxygen: Some(97.5),
            ..Default::default()
        };
        assert!(!partial.is_empty());
        assert_eq!(partial.present_count(), 2);
    }

    #[test]
    fn test_absent_metrics_are_omitted() {
        let snapshot = BiometricSnapshot::new(BiometricReadings {
            heart_rate: Some(64),
            ..Default::default()
        });
        let json = serde_json::to_value(&snapshot).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj["heartRate"], 64);
        assert!(obj.contains_key("timestamp"));
        assert!(!obj.contains_key("steps"));
        assert!(!obj.contains_key("workoutType"));
    }

    #[test]
    fn test_neutral_location() {
        let neutral = LocationSnapshot::neutral();
        assert_eq!(neutral.fix.latitude, 0.0);
        assert_eq!(neutral.fix.longitude, 0.0);
        assert_eq!(neutral.fix.accuracy, 0.0);
    }
}
