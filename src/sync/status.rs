//! Sync status projection observed by the presentation layer.

use chrono::{DateTime, Local, Utc};
use tokio::sync::watch;

/// Progress of the most recent sync pass.
///
/// `Idle` only occurs before the first pass of a process lifetime.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncStatus {
    Idle,
    Syncing,
    Success(DateTime<Utc>),
    Error(String),
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Idle => write!(f, "Ready"),
            SyncStatus::Syncing => write!(f, "Syncing..."),
            SyncStatus::Success(at) => {
                write!(f, "Synced {}", at.with_timezone(&Local).format("%H:%M"))
            }
            SyncStatus::Error(msg) => write!(f, "Sync failed: {msg}"),
        }
    }
}

/// Single writer for the shared [`SyncStatus`].
///
/// Cloning shares the same channel. Observers get a [`watch::Receiver`].
#[derive(Debug, Clone)]
pub struct StatusHandle {
    tx: watch::Sender<SyncStatus>,
}

impl StatusHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SyncStatus::Idle);
        Self { tx }
    }

    pub fn set_syncing(&self) {
        self.tx.send_replace(SyncStatus::Syncing);
    }

    pub fn set_success(&self, at: DateTime<Utc>) {
        self.tx.send_replace(SyncStatus::Success(at));
    }

    pub fn set_error(&self, message: impl Into<String>) {
        self.tx.send_replace(SyncStatus::Error(message.into()));
    }

    pub fn current(&self) -> SyncStatus {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.tx.subscribe()
    }
}

impl Default for StatusHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        let status = StatusHandle::new();
        assert_eq!(status.current(), SyncStatus::Idle);

        status.set_syncing();
        assert_eq!(status.current(), SyncStatus::Syncing);

        status.set_error("Server error: 500");
        assert_eq!(
            status.current(),
            SyncStatus::Error("Server error: 500".to_string())
        );

        let now = Utc::now();
        status.set_syncing();
        status.set_success(now);
        assert_eq!(status.current(), SyncStatus::Success(now));
    }

    #[tokio::test]
    async fn test_observers_see_updates() {
        let status = StatusHandle::new();
        let mut rx = status.subscribe();
        status.clone().set_syncing();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), SyncStatus::Syncing);
    }

    #[test]
    fn test_display() {
        assert_eq!(SyncStatus::Idle.to_string(), "Ready");
        assert_eq!(
            SyncStatus::Error("No user ID".into()).to_string(),
            "Sync failed: No user ID"
        );
        assert!(SyncStatus::Success(Utc::now()).to_string().starts_with("Synced "));
    }
}
