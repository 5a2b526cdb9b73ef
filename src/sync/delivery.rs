//! Delivery pipeline: upload one record and account for the outcome.
//!
//! Every record is written to the offline queue before the upload starts, so
//! a crash mid-request loses nothing. HTTP 200 publishes success and applies
//! the [`QueuePolicy`]; any other outcome leaves the record queued and
//! publishes the error. There is no synchronous retry: the backlog is only
//! touched again by the next successful delivery.
//!
//! Records whose own upload is still in flight are never counted as backlog:
//! a queue clear keeps them and a drain does not re-send them.

use crate::gateway::{GatewayClient, GatewayError};
use crate::sync::payload::SyncRecord;
use crate::sync::queue::OfflineQueue;
use crate::sync::settings::SyncConfiguration;
use crate::sync::status::StatusHandle;
use crate::transparency::SharedTransparencyLog;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

/// What a successful delivery does with the rest of the offline queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuePolicy {
    /// Drop the whole queue, delivered or not. What the collection server
    /// has always seen.
    #[default]
    ClearOnSuccess,
    /// Re-send queued records oldest first and drop only acknowledged ones.
    DrainOnSuccess,
}

/// Delivery failure. The record stays in the offline queue.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("Request timed out")]
    Timeout,
    #[error("Network error: {0}")]
    Transport(String),
    #[error("Server error: {0}")]
    Server(u16),
    #[error("{0}")]
    Rejected(String),
}

impl From<GatewayError> for DeliveryError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Timeout => DeliveryError::Timeout,
            GatewayError::Network(msg) => DeliveryError::Transport(msg),
            GatewayError::Server { status, .. } => DeliveryError::Server(status),
            other => DeliveryError::Rejected(other.to_string()),
        }
    }
}

/// Result of an accepted upload.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivered {
    pub at: DateTime<Utc>,
    /// Backlog records re-sent and acknowledged in the same call
    pub backlog_delivered: usize,
    /// Backlog records dropped without being re-sent
    pub backlog_discarded: usize,
}

pub struct DeliveryPipeline {
    client: GatewayClient,
    queue: Arc<OfflineQueue>,
    status: StatusHandle,
    config: watch::Receiver<SyncConfiguration>,
    policy: QueuePolicy,
    stats: SharedTransparencyLog,
    in_flight: Mutex<Vec<SyncRecord>>,
}

/// Marks a record as uploading until dropped, including when the pass
/// future is cancelled mid-request.
struct InFlight<'a> {
    records: &'a Mutex<Vec<SyncRecord>>,
    record: SyncRecord,
}

impl<'a> InFlight<'a> {
    fn enter(records: &'a Mutex<Vec<SyncRecord>>, record: &SyncRecord) -> Self {
        if let Ok(mut records) = records.lock() {
            records.push(record.clone());
        }
        Self {
            records,
            record: record.clone(),
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Ok(mut records) = self.records.lock() {
            if let Some(pos) = records.iter().position(|r| r == &self.record) {
                records.remove(pos);
            }
        }
    }
}

impl DeliveryPipeline {
    pub fn new(
        client: GatewayClient,
        queue: Arc<OfflineQueue>,
        status: StatusHandle,
        config: watch::Receiver<SyncConfiguration>,
        policy: QueuePolicy,
        stats: SharedTransparencyLog,
    ) -> Self {
        Self {
            client,
            queue,
            status,
            config,
            policy,
            stats,
            in_flight: Mutex::new(Vec::new()),
        }
    }

    pub fn queue(&self) -> &Arc<OfflineQueue> {
        &self.queue
    }

    pub fn policy(&self) -> QueuePolicy {
        self.policy
    }

    /// Upload `record` to the active endpoint.
    #[instrument(skip_all, fields(user_id = record.user_id()))]
    pub async fn deliver(&self, record: SyncRecord) -> Result<Delivered, DeliveryError> {
        // Registered before the append so no other pass sees it as backlog.
        let _in_flight = InFlight::enter(&self.in_flight, &record);
        match self.queue.append(record.clone()).await {
            Ok(len) => info!(queued = len, "record written ahead to offline queue"),
            Err(e) => error!(error = %e, "queue persistence failed; continuing in memory"),
        }

        let endpoint = self.config.borrow().base_url().to_string();
        match self.client.post_record(&endpoint, &record).await {
            Ok(()) => Ok(self.on_success(&endpoint, &record).await),
            Err(e) => {
                let err = DeliveryError::from(e);
                self.on_failure(&record, &err).await;
                Err(err)
            }
        }
    }

    async fn on_success(&self, endpoint: &str, record: &SyncRecord) -> Delivered {
        let at = Utc::now();
        self.stats.record_delivered(at);

        let (backlog_delivered, backlog_discarded) = match self.policy {
            QueuePolicy::ClearOnSuccess => {
                let discarded = self.clear_backlog(record).await;
                if discarded > 0 {
                    warn!(discarded, "offline queue cleared without re-sending backlog");
                    self.stats.record_discarded(discarded as u64);
                }
                (0, discarded)
            }
            QueuePolicy::DrainOnSuccess => {
                if let Err(e) = self.queue.remove(record).await {
                    error!(error = %e, "queue persistence failed after removal");
                }
                (self.drain_backlog(endpoint).await, 0)
            }
        };

        self.status.set_success(at);
        info!(backlog_delivered, backlog_discarded, "record delivered");
        Delivered {
            at,
            backlog_delivered,
            backlog_discarded,
        }
    }

    async fn on_failure(&self, record: &SyncRecord, err: &DeliveryError) {
        self.stats.record_failure();
        // A concurrent success may have cleared the write-ahead entry.
        match self.queue.append_if_absent(record).await {
            Ok(len) => warn!(error = %err, queued = len, "delivery failed; record kept in offline queue"),
            Err(e) => error!(error = %e, "queue persistence failed; record kept in memory only"),
        }
        self.status.set_error(err.to_string());
    }

    fn is_in_flight(&self, record: &SyncRecord) -> bool {
        self.in_flight
            .lock()
            .map(|records| records.contains(record))
            .unwrap_or(false)
    }

    /// Drop the delivered record and the backlog, keeping records that other
    /// passes are still uploading. Returns how many backlog records were
    /// dropped. The in-memory queue is cleared even if the write fails.
    async fn clear_backlog(&self, record: &SyncRecord) -> usize {
        let mut own = 0;
        let (dropped, persisted) = self
            .queue
            .retain(|queued| {
                if queued == record {
                    own += 1;
                    return false;
                }
                self.is_in_flight(queued)
            })
            .await;
        if let Err(e) = persisted {
            error!(error = %e, "queue persistence failed after clear; cleared in memory only");
        }
        dropped.saturating_sub(own)
    }

    /// Re-send queued records oldest first, stopping at the first failure.
    async fn drain_backlog(&self, endpoint: &str) -> usize {
        let mut delivered = 0;
        for queued in self.queue.records().await {
            if self.is_in_flight(&queued) {
                continue;
            }
            if let Err(e) = self.client.post_record(endpoint, &queued).await {
                warn!(error = %e, delivered, "backlog drain stopped");
                break;
            }
            if let Err(e) = self.queue.remove(&queued).await {
                error!(error = %e, "queue persistence failed during drain");
            }
            delivered += 1;
        }
        if delivered > 0 {
            self.stats.record_delivered_backlog(delivered as u64);
        }
        delivered
    }
}
