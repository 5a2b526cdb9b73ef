//! Transparency log of what the agent uploaded.
//!
//! Counts passes and records by outcome, including records that were dropped
//! from the offline queue without ever being re-sent, so a user can see what
//! left the device and what was lost.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Counters for the current and previous sessions.
#[derive(Debug)]
pub struct TransparencyLog {
    /// Sync passes that reached the collection step
    passes_run: AtomicU64,
    /// Passes dropped (overlap, background context, no principal)
    passes_skipped: AtomicU64,
    /// Records built with location only
    location_records: AtomicU64,
    /// Records built with at least one biometric metric
    biometric_records: AtomicU64,
    /// Records accepted by the endpoint
    records_delivered: AtomicU64,
    /// Delivery attempts that failed
    delivery_failures: AtomicU64,
    /// Queued records dropped by a whole-queue clear without being re-sent
    records_discarded: AtomicU64,
    /// Most recent accepted delivery
    last_delivery: Mutex<Option<DateTime<Utc>>>,
    /// Session start time
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl TransparencyLog {
    /// Create a new transparency log.
    pub fn new() -> Self {
        Self {
            passes_run: AtomicU64::new(0),
            passes_skipped: AtomicU64::new(0),
            location_records: AtomicU64::new(0),
            biometric_records: AtomicU64::new(0),
            records_delivered: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
            records_discarded: AtomicU64::new(0),
            last_delivery: Mutex::new(None),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a transparency log that continues from a persisted file.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            debug!(error = %e, "could not load previous transparency stats");
        }

        log
    }

    pub fn record_pass(&self) {
        self.passes_run.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped_pass(&self) {
        self.passes_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a built record, classified by whether it carries biometrics.
    pub fn record_built(&self, with_biometrics: bool) {
        if with_biometrics {
            self.biometric_records.fetch_add(1, Ordering::Relaxed);
        } else {
            self.location_records.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_delivered(&self, at: DateTime<Utc>) {
        self.records_delivered.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_delivery.lock() {
            *last = Some(at);
        }
    }

    /// Record multiple backlog records accepted during a drain.
    pub fn record_delivered_backlog(&self, count: u64) {
        self.records_delivered.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discarded(&self, count: u64) {
        self.records_discarded.fetch_add(count, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> TransparencyStats {
        TransparencyStats {
            passes_run: self.passes_run.load(Ordering::Relaxed),
            passes_skipped: self.passes_skipped.load(Ordering::Relaxed),
            location_records: self.location_records.load(Ordering::Relaxed),
            biometric_records: self.biometric_records.load(Ordering::Relaxed),
            records_delivered: self.records_delivered.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            records_discarded: self.records_discarded.load(Ordering::Relaxed),
            last_delivery: self.last_delivery.lock().ok().and_then(|l| *l),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        let last = stats
            .last_delivery
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        format!(
            "Sync Statistics:\n\
             - Passes run: {}\n\
             - Passes skipped: {}\n\
             - Location-only records: {}\n\
             - Records with biometrics: {}\n\
             - Records delivered: {}\n\
             - Delivery failures: {}\n\
             - Queued records discarded without retry: {}\n\
             - Last delivery: {}\n\
             - Session duration: {} seconds",
            stats.passes_run,
            stats.passes_skipped,
            stats.location_records,
            stats.biometric_records,
            stats.records_delivered,
            stats.delivery_failures,
            stats.records_discarded,
            last,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                passes_run: stats.passes_run,
                passes_skipped: stats.passes_skipped,
                location_records: stats.location_records,
                biometric_records: stats.biometric_records,
                records_delivered: stats.records_delivered,
                delivery_failures: stats.delivery_failures,
                records_discarded: stats.records_discarded,
                last_delivery: stats.last_delivery,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    /// Load stats from disk.
    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.passes_run.store(persisted.passes_run, Ordering::Relaxed);
                self.passes_skipped
                    .store(persisted.passes_skipped, Ordering::Relaxed);
                self.location_records
                    .store(persisted.location_records, Ordering::Relaxed);
                self.biometric_records
                    .store(persisted.biometric_records, Ordering::Relaxed);
                self.records_delivered
                    .store(persisted.records_delivered, Ordering::Relaxed);
                self.delivery_failures
                    .store(persisted.delivery_failures, Ordering::Relaxed);
                self.records_discarded
                    .store(persisted.records_discarded, Ordering::Relaxed);
                if let Ok(mut last) = self.last_delivery.lock() {
                    *last = persisted.last_delivery;
                }
            }
        }
        Ok(())
    }

    /// Reset all counters. `save` afterwards to make it stick.
    pub fn reset(&self) {
        self.passes_run.store(0, Ordering::Relaxed);
        self.passes_skipped.store(0, Ordering::Relaxed);
        self.location_records.store(0, Ordering::Relaxed);
        self.biometric_records.store(0, Ordering::Relaxed);
        self.records_delivered.store(0, Ordering::Relaxed);
        self.delivery_failures.store(0, Ordering::Relaxed);
        self.records_discarded.store(0, Ordering::Relaxed);
        if let Ok(mut last) = self.last_delivery.lock() {
            *last = None;
        }
    }
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of transparency statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransparencyStats {
    pub passes_run: u64,
    pub passes_skipped: u64,
    pub location_records: u64,
    pub biometric_records: u64,
    pub records_delivered: u64,
    pub delivery_failures: u64,
    pub records_discarded: u64,
    pub last_delivery: Option<DateTime<Utc>>,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    passes_run: u64,
    passes_skipped: u64,
    location_records: u64,
    biometric_records: u64,
    records_delivered: u64,
    delivery_failures: u64,
    records_discarded: u64,
    #[serde(default)]
    last_delivery: Option<DateTime<Utc>>,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared transparency log.
pub type SharedTransparencyLog = Arc<TransparencyLog>;

/// Create a new shared transparency log.
pub fn create_shared_log() -> SharedTransparencyLog {
    Arc::new(TransparencyLog::new())
}

/// Create a new shared transparency log with persistence.
pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedTransparencyLog {
    Arc::new(TransparencyLog::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_transparency_log_counting() {
        let log = TransparencyLog::new();

        log.record_pass();
        log.record_pass();
        log.record_built(false);
        log.record_built(true);
        log.record_failure();
        log.record_discarded(3);

        let stats = log.stats();
        assert_eq!(stats.passes_run, 2);
        assert_eq!(stats.location_records, 1);
        assert_eq!(stats.biometric_records, 1);
        assert_eq!(stats.delivery_failures, 1);
        assert_eq!(stats.records_discarded, 3);
        assert!(stats.last_delivery.is_none());
    }

    #[test]
    fn test_transparency_log_reset() {
        let log = TransparencyLog::new();

        log.record_delivered(Utc::now());
        log.record_delivered_backlog(4);
        assert_eq!(log.stats().records_delivered, 5);
        log.reset();

        let stats = log.stats();
        assert_eq!(stats.records_delivered, 0);
        assert!(stats.last_delivery.is_none());
    }

    #[test]
    fn test_reset_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("transparency.json");

        let log = TransparencyLog::with_persistence(path.clone());
        log.record_pass();
        log.record_discarded(2);
        log.record_delivered(Utc::now());
        log.save().unwrap();

        let reloaded = TransparencyLog::with_persistence(path.clone());
        reloaded.reset();
        reloaded.save().unwrap();

        let stats = TransparencyLog::with_persistence(path).stats();
        assert_eq!(stats.passes_run, 0);
        assert_eq!(stats.records_discarded, 0);
        assert_eq!(stats.records_delivered, 0);
        assert!(stats.last_delivery.is_none());
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("transparency.json");

        let log = TransparencyLog::with_persistence(path.clone());
        log.record_pass();
        log.record_delivered(Utc::now());
        log.save().unwrap();

        let restored = TransparencyLog::with_persistence(path);
        let stats = restored.stats();
        assert_eq!(stats.passes_run, 1);
        assert_eq!(stats.records_delivered, 1);
        assert!(stats.last_delivery.is_some());
    }

    #[test]
    fn test_summary_format() {
        let log = TransparencyLog::new();
        let summary = log.summary();

        assert!(summary.contains("Records delivered"));
        assert!(summary.contains("discarded without retry"));
        assert!(summary.contains("Last delivery: never"));
    }
}
