//! Durable offline queue of undelivered records.
//!
//! The queue is a JSON array of [`SyncRecord`] in the agent's data directory.
//! It is rewritten after every mutation, while the mutation lock is still
//! held, through a temporary file and a rename so a crash leaves either the
//! old or the new contents on disk.

use crate::sync::payload::SyncRecord;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// File name of the persisted queue inside the data directory.
pub const QUEUE_FILE_NAME: &str = "offline_queue.json";

/// Queue persistence failure.
///
/// The in-memory queue keeps the mutation; only durability is lost.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Queue serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug)]
pub struct OfflineQueue {
    path: PathBuf,
    records: Mutex<Vec<SyncRecord>>,
}

impl OfflineQueue {
    /// Open the queue at `path`, loading whatever was last persisted.
    ///
    /// A missing file is an empty queue. An unreadable file is logged and
    /// treated as empty; it is left untouched until the next mutation.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match load(&path).await {
            Ok(records) => {
                if !records.is_empty() {
                    debug!(count = records.len(), "offline queue restored");
                }
                records
            }
            Err(e) => {
                warn!(error = %e, path = %path.display(), "could not restore offline queue");
                Vec::new()
            }
        };
        Self {
            path,
            records: Mutex::new(records),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn count(&self) -> usize {
        self.records.lock().await.len()
    }

    /// Copy of the queued records, oldest first.
    pub async fn records(&self) -> Vec<SyncRecord> {
        self.records.lock().await.clone()
    }

    pub async fn contains(&self, record: &SyncRecord) -> bool {
        self.records.lock().await.contains(record)
    }

    /// Append and persist. Returns the new length.
    pub async fn append(&self, record: SyncRecord) -> Result<usize, QueueError> {
        let mut records = self.records.lock().await;
        records.push(record);
        let len = records.len();
        persist(&self.path, &records).await?;
        Ok(len)
    }

    /// Append unless an equal record is already queued. Returns the new length.
    pub async fn append_if_absent(&self, record: &SyncRecord) -> Result<usize, QueueError> {
        let mut records = self.records.lock().await;
        if records.contains(record) {
            return Ok(records.len());
        }
        records.push(record.clone());
        let len = records.len();
        persist(&self.path, &records).await?;
        Ok(len)
    }

    /// Remove the first record equal to `record`. Returns whether one was removed.
    pub async fn remove(&self, record: &SyncRecord) -> Result<bool, QueueError> {
        let mut records = self.records.lock().await;
        let Some(pos) = records.iter().position(|r| r == record) else {
            return Ok(false);
        };
        records.remove(pos);
        persist(&self.path, &records).await?;
        Ok(true)
    }

    /// Empty the queue and persist. Returns how many records were dropped.
    pub async fn clear_all(&self) -> Result<usize, QueueError> {
        let mut records = self.records.lock().await;
        let dropped = records.len();
        records.clear();
        persist(&self.path, &records).await?;
        Ok(dropped)
    }

    /// Drop every record `keep` rejects, then persist.
    ///
    /// Returns the number dropped alongside the persistence result, since
    /// the in-memory drop stands even when the write fails.
    pub async fn retain<F>(&self, mut keep: F) -> (usize, Result<(), QueueError>)
    where
        F: FnMut(&SyncRecord) -> bool,
    {
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|r| keep(r));
        let dropped = before - records.len();
        (dropped, persist(&self.path, &records).await)
    }

    /// Rewrite the file from the in-memory state.
    pub async fn persist(&self) -> Result<(), QueueError> {
        let records = self.records.lock().await;
        persist(&self.path, &records).await
    }
}

/// Read the persisted queue without opening it for mutation.
pub async fn load(path: &Path) -> Result<Vec<SyncRecord>, QueueError> {
    if !tokio::fs::try_exists(path).await? {
        return Ok(Vec::new());
    }
    let content = tokio::fs::read_to_string(path).await?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&content)?)
}

async fn persist(path: &Path, records: &[SyncRecord]) -> Result<(), QueueError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec(records)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::LocationSnapshot;
    use crate::sync::payload::{build, DeviceInfo};
    use crate::sync::settings::SyncConfiguration;
    use tempfile::tempdir;

    fn record(user: &str) -> SyncRecord {
        build(
            user,
            &LocationSnapshot::new(1.0, 2.0, 3.0, 4.0, 5.0),
            None,
            &DeviceInfo::current(true),
            &SyncConfiguration::default(),
        )
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(QUEUE_FILE_NAME);

        let queue = OfflineQueue::open(&path).await;
        assert_eq!(queue.count().await, 0);
        assert_eq!(queue.append(record("a")).await.unwrap(), 1);
        assert_eq!(queue.append(record("b")).await.unwrap(), 2);
        drop(queue);

        let reopened = OfflineQueue::open(&path).await;
        let records = reopened.records().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].user_id(), "a");
        assert_eq!(records[1].user_id(), "b");
    }

    #[tokio::test]
    async fn test_clear_all_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(QUEUE_FILE_NAME);
        let queue = OfflineQueue::open(&path).await;
        queue.append(record("a")).await.unwrap();
        queue.append(record("b")).await.unwrap();

        assert_eq!(queue.clear_all().await.unwrap(), 2);
        assert_eq!(queue.count().await, 0);
        assert!(load(&path).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_and_append_if_absent() {
        let dir = tempdir().unwrap();
        let queue = OfflineQueue::open(dir.path().join(QUEUE_FILE_NAME)).await;
        let a = record("a");
        let b = record("b");
        queue.append(a.clone()).await.unwrap();

        assert_eq!(queue.append_if_absent(&a).await.unwrap(), 1);
        assert_eq!(queue.append_if_absent(&b).await.unwrap(), 2);
        assert!(queue.remove(&a).await.unwrap());
        assert!(!queue.remove(&a).await.unwrap());
        assert!(queue.contains(&b).await);
        assert_eq!(queue.count().await, 1);
    }

    #[tokio::test]
    async fn test_retain_persists_kept_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(QUEUE_FILE_NAME);
        let queue = OfflineQueue::open(&path).await;
        for user in ["a", "b", "c"] {
            queue.append(record(user)).await.unwrap();
        }

        let (dropped, persisted) = queue.retain(|r| r.user_id() == "b").await;
        assert_eq!(dropped, 2);
        assert!(persisted.is_ok());
        let on_disk = load(&path).await.unwrap();
        assert_eq!(on_disk.len(), 1);
        assert_eq!(on_disk[0].user_id(), "b");
    }

    #[tokio::test]
    async fn test_unwritable_path_keeps_memory_authoritative() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();
        let queue = OfflineQueue::open(blocker.join(QUEUE_FILE_NAME)).await;

        assert!(queue.append(record("a")).await.is_err());
        assert!(queue.append(record("b")).await.is_err());
        assert_eq!(queue.count().await, 2);

        let (dropped, persisted) = queue.retain(|_| false).await;
        assert_eq!(dropped, 2);
        assert!(persisted.is_err());
        assert_eq!(queue.count().await, 0);
    }

    #[tokio::test]
    async fn test_corrupt_file_opens_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(QUEUE_FILE_NAME);
        std::fs::write(&path, "[{ broken").unwrap();

        let queue = OfflineQueue::open(&path).await;
        assert_eq!(queue.count().await, 0);
        // Left alone until the next mutation.
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[{ broken");
    }
}
