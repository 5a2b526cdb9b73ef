//! One sync pass: collect, build, deliver.
//!
//! Passes of the same metric class never overlap; a pass that finds its
//! class busy is dropped, not queued. Passes of different classes run side
//! by side.

use crate::collector::{Authorization, BiometricSnapshot, Collector, LocationSnapshot};
use crate::sync::delivery::DeliveryPipeline;
use crate::sync::payload::{self, DeviceInfo};
use crate::sync::resolver::ConfigResolver;
use crate::sync::status::StatusHandle;
use crate::sync::{ExecutionContext, MetricClass, PassOutcome, PassRunner, SkipReason, SyncKind};
use crate::transparency::SharedTransparencyLog;
use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, instrument, warn};

/// Default upper bound for a single provider pull.
pub const DEFAULT_COLLECTOR_TIMEOUT: Duration = Duration::from_secs(10);

pub struct SyncEngine {
    collector: Arc<dyn Collector>,
    resolver: Arc<ConfigResolver>,
    pipeline: DeliveryPipeline,
    status: StatusHandle,
    device: DeviceInfo,
    stats: SharedTransparencyLog,
    principal: RwLock<Option<String>>,
    collector_timeout: Duration,
    location_guard: Arc<Mutex<()>>,
    biometric_guard: Arc<Mutex<()>>,
}

/// Held for the duration of a pass.
struct PassGuard {
    _held: Vec<OwnedMutexGuard<()>>,
}

impl SyncEngine {
    pub fn new(
        collector: Arc<dyn Collector>,
        resolver: Arc<ConfigResolver>,
        pipeline: DeliveryPipeline,
        status: StatusHandle,
        device: DeviceInfo,
        stats: SharedTransparencyLog,
    ) -> Self {
        Self {
            collector,
            resolver,
            pipeline,
            status,
            device,
            stats,
            principal: RwLock::new(None),
            collector_timeout: DEFAULT_COLLECTOR_TIMEOUT,
            location_guard: Arc::new(Mutex::new(())),
            biometric_guard: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_principal(self, principal: impl Into<String>) -> Self {
        self.set_principal(Some(principal.into()));
        self
    }

    pub fn with_collector_timeout(mut self, timeout: Duration) -> Self {
        self.collector_timeout = timeout;
        self
    }

    /// Sign a principal in or out.
    pub fn set_principal(&self, principal: Option<String>) {
        match self.principal.write() {
            Ok(mut guard) => *guard = principal,
            Err(poisoned) => *poisoned.into_inner() = principal,
        }
    }

    pub fn principal(&self) -> Option<String> {
        match self.principal.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn resolver(&self) -> &Arc<ConfigResolver> {
        &self.resolver
    }

    pub fn pipeline(&self) -> &DeliveryPipeline {
        &self.pipeline
    }

    pub fn status(&self) -> &StatusHandle {
        &self.status
    }

    /// Ask both providers for access. Prompts are outside the agent's control.
    pub async fn request_authorizations(&self) -> (Authorization, Authorization) {
        let location = self.collector.request_location_authorization().await;
        let biometric = self.collector.request_biometric_authorization().await;
        info!(%location, %biometric, "provider authorization");
        (location, biometric)
    }

    /// Refresh the remote configuration for the signed-in principal.
    pub async fn refresh_config(&self) {
        match self.principal() {
            Some(principal) => {
                self.resolver.fetch(&principal).await;
            }
            None => debug!("no principal; skipping config refresh"),
        }
    }

    /// The app came to the foreground: refresh settings and, if enabled,
    /// run a manual pass.
    pub async fn on_foreground_activate(&self) -> Option<PassOutcome> {
        self.refresh_config().await;
        if !self.resolver.current().sync_on_app_open {
            debug!("sync on app open disabled");
            return None;
        }
        Some(self.run_pass(SyncKind::Manual, ExecutionContext::Foreground).await)
    }

    /// Run one pass of `kind`.
    #[instrument(skip(self))]
    pub async fn run_pass(&self, kind: SyncKind, context: ExecutionContext) -> PassOutcome {
        let include_biometrics = kind.wants_biometrics() && context.allows_biometrics();
        if kind == SyncKind::Biometric && !include_biometrics {
            debug!("biometric pass skipped outside the foreground");
            self.stats.record_skipped_pass();
            return PassOutcome::Skipped(SkipReason::BackgroundContext);
        }

        let Some(_guard) = self.try_guard(kind, include_biometrics) else {
            debug!("previous pass of this class still running; dropping");
            self.stats.record_skipped_pass();
            return PassOutcome::Skipped(SkipReason::Busy);
        };

        let Some(principal) = self.principal() else {
            warn!("sync skipped: no user ID");
            self.status.set_error("No user ID");
            self.stats.record_skipped_pass();
            return PassOutcome::Skipped(SkipReason::NoPrincipal);
        };

        self.status.set_syncing();
        self.stats.record_pass();
        let settings = self.resolver.current();

        let (location, biometrics) = tokio::join!(self.pull_location(), async {
            if include_biometrics {
                Some(self.pull_biometrics().await)
            } else {
                None
            }
        });

        let record = payload::build(
            &principal,
            &location,
            biometrics.as_ref(),
            &self.device,
            &settings,
        );
        self.stats.record_built(record.has_biometrics());

        match self.pipeline.deliver(record).await {
            Ok(delivered) => PassOutcome::Delivered(delivered),
            Err(e) => PassOutcome::Failed(e),
        }
    }

    fn try_guard(&self, kind: SyncKind, include_biometrics: bool) -> Option<PassGuard> {
        let classes: &[MetricClass] = match kind {
            SyncKind::Location => &[MetricClass::Location],
            SyncKind::Biometric => &[MetricClass::Biometric],
            SyncKind::Combined | SyncKind::Manual if include_biometrics => {
                &[MetricClass::Location, MetricClass::Biometric]
            }
            SyncKind::Combined | SyncKind::Manual => &[MetricClass::Location],
        };

        let mut held = Vec::with_capacity(classes.len());
        for class in classes {
            let lock = match class {
                MetricClass::Location => &self.location_guard,
                MetricClass::Biometric => &self.biometric_guard,
            };
            held.push(Arc::clone(lock).try_lock_owned().ok()?);
        }
        Some(PassGuard { _held: held })
    }

    async fn pull_location(&self) -> LocationSnapshot {
        match tokio::time::timeout(self.collector_timeout, self.collector.pull_location()).await {
            Ok(Some(location)) => location,
            Ok(None) => {
                debug!("no location fix yet; using neutral location");
                LocationSnapshot::neutral()
            }
            Err(_) => {
                warn!("location pull timed out; using neutral location");
                LocationSnapshot::neutral()
            }
        }
    }

    async fn pull_biometrics(&self) -> BiometricSnapshot {
        match tokio::time::timeout(self.collector_timeout, self.collector.pull_biometrics()).await {
            Ok(snapshot) => {
                debug!(present = snapshot.readings.present_count(), "biometrics pulled");
                snapshot
            }
            Err(_) => {
                warn!("biometric pull timed out; sending without biometrics");
                BiometricSnapshot::empty()
            }
        }
    }
}

#[async_trait]
impl PassRunner for SyncEngine {
    async fn run_pass(&self, kind: SyncKind, context: ExecutionContext) -> PassOutcome {
        SyncEngine::run_pass(self, kind, context).await
    }
}
