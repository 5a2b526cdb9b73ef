//! Configuration resolver.
//!
//! Holds the active [`SyncConfiguration`] in a watch channel. The resolver is
//! the only writer; the scheduler subscribes and re-arms on every change.

use crate::gateway::{ConfigUpdate, GatewayClient, RemoteSyncConfig};
use crate::sync::settings::{interval_from_text, LocationPrecision, SyncConfiguration};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

pub struct ConfigResolver {
    client: GatewayClient,
    tx: watch::Sender<SyncConfiguration>,
    fetched: AtomicBool,
}

impl ConfigResolver {
    /// Start from `initial` (normally the built-in defaults).
    pub fn new(client: GatewayClient, initial: SyncConfiguration) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self {
            client,
            tx,
            fetched: AtomicBool::new(false),
        }
    }

    /// Snapshot of the active configuration.
    pub fn current(&self) -> SyncConfiguration {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncConfiguration> {
        self.tx.subscribe()
    }

    /// Whether a remote configuration has been obtained in this process.
    pub fn has_remote(&self) -> bool {
        self.fetched.load(Ordering::SeqCst)
    }

    /// Fetch the remote configuration for `principal`.
    ///
    /// Any network or decode failure keeps the active configuration as is and
    /// returns it. Observers are notified only if the value changed.
    #[instrument(skip(self))]
    pub async fn fetch(&self, principal: &str) -> SyncConfiguration {
        let current = self.current();
        let response = match self.client.fetch_status(current.base_url(), principal).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "config fetch failed; keeping active configuration");
                return current;
            }
        };

        let Some(remote) = response.sync_config else {
            warn!("status response has no syncConfig; keeping active configuration");
            return current;
        };

        let merged = merge_remote(&current, &remote);
        self.fetched.store(true, Ordering::SeqCst);

        let changed = self.tx.send_if_modified(|active| {
            if *active == merged {
                false
            } else {
                *active = merged.clone();
                true
            }
        });
        if changed {
            info!(
                location_minutes = merged.location_interval.as_secs() / 60,
                biometric_minutes = merged.biometric_interval.as_secs() / 60,
                "sync configuration updated from control plane"
            );
        } else {
            debug!("remote configuration unchanged");
        }
        merged
    }

    /// Apply a local settings edit and push it to the control plane.
    ///
    /// The new configuration is active (and the scheduler alerted) before this
    /// returns. The push runs on its own task and its failure is only logged.
    pub fn update(self: &Arc<Self>, principal: &str, config: SyncConfiguration) -> JoinHandle<()> {
        self.tx.send_replace(config.clone());
        info!("sync settings edited locally");

        let resolver = Arc::clone(self);
        let principal = principal.to_string();
        tokio::spawn(async move {
            let update = ConfigUpdate::new(&principal, &config);
            match resolver
                .client
                .push_config_update(config.base_url(), &update)
                .await
            {
                Ok(()) => info!("settings pushed to control plane"),
                Err(e) => warn!(error = %e, "settings push failed; local settings stay active"),
            }
        })
    }
}

/// Overlay the fields carried by `remote` onto `current`.
///
/// The endpoint is never taken from the remote side.
pub fn merge_remote(current: &SyncConfiguration, remote: &RemoteSyncConfig) -> SyncConfiguration {
    let mut merged = current.clone();
    if let Some(value) = &remote.location_interval {
        merged.location_interval = interval_from_value(value);
    }
    if let Some(value) = &remote.biometric_interval {
        merged.biometric_interval = interval_from_value(value);
    }
    if let Some(flag) = remote.sync_on_app_open {
        merged.sync_on_app_open = flag;
    }
    if let Some(flag) = remote.notifications_enabled {
        merged.notifications_enabled = flag;
    }
    if let Some(precision) = &remote.location_precision {
        match serde_json::from_value::<LocationPrecision>(serde_json::Value::String(
            precision.clone(),
        )) {
            Ok(p) => merged.location_precision = p,
            Err(_) => debug!(%precision, "ignoring unknown location precision"),
        }
    }
    merged
}

/// Text goes through [`interval_from_text`]; a bare number means minutes.
fn interval_from_value(value: &serde_json::Value) -> Duration {
    match value {
        serde_json::Value::String(text) => interval_from_text(text),
        serde_json::Value::Number(n) => match n.as_u64() {
            Some(minutes) if minutes > 0 => Duration::from_secs(minutes * 60),
            _ => interval_from_text(""),
        },
        _ => interval_from_text(""),
    }
}
