//! Synchronization engine.
//!
//! This module contains:
//! - Sync settings and the configuration resolver
//! - The payload builder and wire record
//! - Delivery with the durable offline queue
//! - The interval scheduler and the background execution coordinator
//! - The status projection shown to the user

pub mod background;
pub mod delivery;
pub mod engine;
pub mod payload;
pub mod queue;
pub mod resolver;
pub mod scheduler;
pub mod settings;
pub mod status;

use async_trait::async_trait;
use std::time::Duration;

// Re-export commonly used types
pub use background::{
    BackgroundCoordinator, ExecutionGrant, GrantError, GrantHost, GrantOutcome, GrantRequest,
    LeaseState, LocalGrantHost,
};
pub use delivery::{Delivered, DeliveryError, DeliveryPipeline, QueuePolicy};
pub use engine::SyncEngine;
pub use payload::{build, DeviceInfo, SyncRecord};
pub use queue::{OfflineQueue, QueueError};
pub use resolver::ConfigResolver;
pub use scheduler::IntervalScheduler;
pub use settings::{interval_from_text, LocationPrecision, SyncConfiguration};
pub use status::{StatusHandle, SyncStatus};

/// The two independently scheduled measurement classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricClass {
    Location,
    Biometric,
}

impl MetricClass {
    pub const ALL: [MetricClass; 2] = [MetricClass::Location, MetricClass::Biometric];

    /// Cadence of this class under `config`.
    pub fn interval(self, config: &settings::SyncConfiguration) -> Duration {
        match self {
            MetricClass::Location => config.location_interval,
            MetricClass::Biometric => config.biometric_interval,
        }
    }

    /// The pass a trigger of this class runs.
    pub fn kind(self) -> SyncKind {
        match self {
            MetricClass::Location => SyncKind::Location,
            MetricClass::Biometric => SyncKind::Biometric,
        }
    }
}

impl std::fmt::Display for MetricClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricClass::Location => write!(f, "location"),
            MetricClass::Biometric => write!(f, "biometric"),
        }
    }
}

/// What a sync pass collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKind {
    /// Location only (location trigger)
    Location,
    /// Biometrics plus the last known location (biometric trigger)
    Biometric,
    /// Both classes (background window)
    Combined,
    /// Both classes, requested by the user or by app activation
    Manual,
}

impl SyncKind {
    /// Whether the pass wants biometrics at all.
    pub fn wants_biometrics(self) -> bool {
        !matches!(self, SyncKind::Location)
    }
}

impl std::fmt::Display for SyncKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncKind::Location => write!(f, "location"),
            SyncKind::Biometric => write!(f, "biometric"),
            SyncKind::Combined => write!(f, "combined"),
            SyncKind::Manual => write!(f, "manual"),
        }
    }
}

/// Where a pass runs. Biometric providers only answer in the foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionContext {
    Foreground,
    Background,
}

impl ExecutionContext {
    pub fn allows_biometrics(self) -> bool {
        matches!(self, ExecutionContext::Foreground)
    }
}

/// Why a pass did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A pass of the same class is still running
    Busy,
    /// Biometric-only pass requested without foreground time
    BackgroundContext,
    /// No principal is signed in
    NoPrincipal,
}

/// Result of one sync pass.
#[derive(Debug, Clone, PartialEq)]
pub enum PassOutcome {
    Delivered(Delivered),
    Failed(DeliveryError),
    Skipped(SkipReason),
}

impl PassOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, PassOutcome::Delivered(_))
    }

    /// Whether the pass ended without an error worth reporting.
    pub fn is_success(&self) -> bool {
        match self {
            PassOutcome::Delivered(_) => true,
            PassOutcome::Skipped(SkipReason::Busy | SkipReason::BackgroundContext) => true,
            PassOutcome::Skipped(SkipReason::NoPrincipal) | PassOutcome::Failed(_) => false,
        }
    }
}

/// Runs sync passes. The scheduler and the background coordinator only see
/// this seam.
#[async_trait]
pub trait PassRunner: Send + Sync {
    async fn run_pass(&self, kind: SyncKind, context: ExecutionContext) -> PassOutcome;
}
