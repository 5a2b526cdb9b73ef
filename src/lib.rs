//! Synheart Sync Agent - background uploader for biometric and location data.
//!
//! This library periodically collects biometric metrics and the device's
//! location, packages them with device metadata and the active sync
//! settings, and uploads each record to a collection endpoint. Records that
//! cannot be delivered are kept in a durable offline queue.
//!
//! # Data Handling
//!
//! - **Pull only**: Providers are read when a pass runs, never streamed
//! - **Absent is absent**: Missing metrics are omitted, not zero-filled
//! - **Durable**: Every record is on disk before its upload starts
//! - **Transparency**: Delivered, failed and discarded records are counted
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Synheart Sync Agent                      │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐         │
//! │  │  Resolver   │──▶│  Scheduler  │──▶│   Engine    │         │
//! │  │ (settings)  │   │ (2 classes) │   │   (pass)    │         │
//! │  └─────────────┘   └─────────────┘   └─────────────┘         │
//! │         │                 ▲                 │                │
//! │         │          ┌─────────────┐          ▼                │
//! │         └─────────▶│ Background  │   ┌─────────────┐         │
//! │                    │ Coordinator │   │  Delivery   │──▶ HTTP │
//! │                    └─────────────┘   │  + Queue    │         │
//! │                                      └─────────────┘         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use synheart_sync_agent::collector::NoopCollector;
//! use synheart_sync_agent::gateway::GatewayClient;
//! use synheart_sync_agent::sync::{
//!     ConfigResolver, DeliveryPipeline, DeviceInfo, ExecutionContext, OfflineQueue,
//!     QueuePolicy, StatusHandle, SyncConfiguration, SyncEngine, SyncKind,
//! };
//! use synheart_sync_agent::transparency::create_shared_log;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let client = GatewayClient::new(std::time::Duration::from_secs(15))?;
//! let resolver = Arc::new(ConfigResolver::new(client.clone(), SyncConfiguration::default()));
//! let queue = Arc::new(OfflineQueue::open("offline_queue.json").await);
//! let status = StatusHandle::new();
//! let stats = create_shared_log();
//! let pipeline = DeliveryPipeline::new(
//!     client,
//!     queue,
//!     status.clone(),
//!     resolver.subscribe(),
//!     QueuePolicy::default(),
//!     stats.clone(),
//! );
//! let engine = SyncEngine::new(
//!     Arc::new(NoopCollector::new()),
//!     resolver,
//!     pipeline,
//!     status,
//!     DeviceInfo::current(false),
//!     stats,
//! )
//! .with_principal("u1");
//!
//! let outcome = engine.run_pass(SyncKind::Manual, ExecutionContext::Foreground).await;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

pub mod collector;
pub mod config;
pub mod gateway;
pub mod sync;
pub mod transparency;

// Re-export key types at crate root for convenience
pub use collector::{Collector, CollectorError, FileCollector, NoopCollector};
pub use config::{Config, ConfigError};
pub use gateway::{GatewayClient, GatewayError};
pub use sync::{
    BackgroundCoordinator, DeliveryPipeline, IntervalScheduler, OfflineQueue, StatusHandle,
    SyncConfiguration, SyncEngine, SyncStatus,
};
pub use transparency::{SharedTransparencyLog, TransparencyLog, TransparencyStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Data declaration that can be displayed to users.
pub const DATA_DECLARATION: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║             SYNHEART SYNC AGENT - DATA DECLARATION               ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This agent uploads health and location snapshots for research.  ║
║                                                                  ║
║  ✓ WHAT WE SEND:                                                 ║
║    • Location (latitude, longitude, accuracy, altitude, speed)   ║
║    • Biometrics you authorized (steps, heart rate, HRV, blood    ║
║      pressure, blood oxygen, energy, distance, sleep, workouts)  ║
║    • Device model, OS version and app version                    ║
║    • Your current sync settings                                  ║
║                                                                  ║
║  ✗ WHAT WE NEVER SEND:                                           ║
║    • Metrics you did not authorize (they are omitted, not zero)  ║
║    • Biometrics from passes without foreground time              ║
║    • Anything to an endpoint other than the configured one       ║
║                                                                  ║
║  Records that fail to upload stay in a local offline queue.      ║
║                                                                  ║
║  You can view upload statistics anytime with:                    ║
║    synheart-sync status                                          ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_declaration_contents() {
        assert!(DATA_DECLARATION.contains("DATA DECLARATION"));
        assert!(DATA_DECLARATION.contains("NEVER SEND"));
        assert!(DATA_DECLARATION.contains("offline queue"));
    }
}
