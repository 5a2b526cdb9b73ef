//! Collector interface over the biometric and location providers.
//!
//! The providers themselves live outside the agent. The engine only pulls
//! snapshots through [`Collector`]; a provider that cannot answer degrades to
//! absent fields rather than failing the pull.

pub mod file;
pub mod noop;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

// Re-export commonly used types
pub use file::FileCollector;
pub use noop::NoopCollector;
pub use types::{
    Authorization, BiometricReadings, BiometricSnapshot, LocationFix, LocationSnapshot,
};

/// Pull-based contract over the two data providers.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Read the current biometric metrics. Never fails: missing data is
    /// reported as `None` fields.
    async fn pull_biometrics(&self) -> BiometricSnapshot;

    /// Last known location fix, or `None` before the first fix.
    async fn pull_location(&self) -> Option<LocationSnapshot>;

    /// One-shot, user-facing biometric authorization prompt.
    async fn request_biometric_authorization(&self) -> Authorization;

    /// One-shot, user-facing location authorization prompt.
    async fn request_location_authorization(&self) -> Authorization;
}

/// Errors raised inside collector implementations.
///
/// These never escape a pull; they are logged and the affected data is
/// reported as absent.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("Data source unavailable: {0}")]
    Unavailable(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}
