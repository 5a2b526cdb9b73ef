//! Collector for hosts without any data provider.
//!
//! Every biometric pull is all-null and no location fix is ever known, so
//! records carry the neutral location. Useful for exercising the upload path
//! on machines with no sensors.

use crate::collector::types::{Authorization, BiometricSnapshot, LocationSnapshot};
use crate::collector::Collector;
use async_trait::async_trait;

/// A collector that never has data.
#[derive(Debug, Default, Clone)]
pub struct NoopCollector;

impl NoopCollector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Collector for NoopCollector {
    async fn pull_biometrics(&self) -> BiometricSnapshot {
        BiometricSnapshot::empty()
    }

    async fn pull_location(&self) -> Option<LocationSnapshot> {
        None
    }

    async fn request_biometric_authorization(&self) -> Authorization {
        Authorization::Unavailable
    }

    async fn request_location_authorization(&self) -> Authorization {
        Authorization::Unavailable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_has_no_data() {
        let collector = NoopCollector::new();
        assert!(collector.pull_location().await.is_none());
        assert!(collector.pull_biometrics().await.readings.is_empty());
        assert_eq!(
            collector.request_location_authorization().await,
            Authorization::Unavailable
        );
    }
}
