//! File-backed collector.
//!
//! Reads the latest readings from a JSON drop file written by an external
//! provider bridge (a companion app, a watch exporter, a test fixture):
//!
//! ```json
//! {
//!   "location": { "latitude": 37.0, "longitude": -122.0, "accuracy": 5.0,
//!                 "altitude": 12.0, "speed": 0.0 },
//!   "biometrics": { "steps": 4200, "heartRate": 71 }
//! }
//! ```
//!
//! The file is re-read on every pull. A missing or malformed file degrades to
//! "no data" and is logged, matching the provider contract.

use crate::collector::types::{
    Authorization, BiometricReadings, BiometricSnapshot, LocationFix, LocationSnapshot,
};
use crate::collector::{Collector, CollectorError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Default, Deserialize)]
struct DropFile {
    #[serde(default)]
    location: Option<DropLocation>,
    #[serde(default)]
    biometrics: Option<BiometricReadings>,
}

#[derive(Debug, Deserialize)]
struct DropLocation {
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(flatten)]
    fix: LocationFix,
}

/// Collector reading snapshots from a JSON file.
#[derive(Debug, Clone)]
pub struct FileCollector {
    path: PathBuf,
}

impl FileCollector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<DropFile, CollectorError> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Err(CollectorError::Unavailable(format!(
                "no snapshot file at {}",
                self.path.display()
            )));
        }
        let content = tokio::fs::read_to_string(&self.path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    async fn read_or_empty(&self) -> DropFile {
        match self.read().await {
            Ok(file) => file,
            Err(CollectorError::Unavailable(msg)) => {
                debug!(%msg, "snapshot source absent");
                DropFile::default()
            }
            Err(e) => {
                warn!(error = %e, path = %self.path.display(), "could not read snapshot source");
                DropFile::default()
            }
        }
    }

    async fn authorization(&self) -> Authorization {
        match tokio::fs::try_exists(&self.path).await {
            Ok(true) => Authorization::Granted,
            _ => Authorization::Unavailable,
        }
    }
}

#[async_trait]
impl Collector for FileCollector {
    async fn pull_biometrics(&self) -> BiometricSnapshot {
        let readings = self.read_or_empty().await.biometrics.unwrap_or_default();
        BiometricSnapshot::new(readings)
    }

    async fn pull_location(&self) -> Option<LocationSnapshot> {
        self.read_or_empty().await.location.map(|loc| LocationSnapshot {
            timestamp: loc.timestamp.unwrap_or_else(Utc::now),
            fix: loc.fix,
        })
    }

    async fn request_biometric_authorization(&self) -> Authorization {
        self.authorization().await
    }

    async fn request_location_authorization(&self) -> Authorization {
        self.authorization().await
    }
}
