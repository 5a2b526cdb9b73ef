//! Background execution coordinator.
//!
//! The host grants short, leased windows of execution time. Each window
//! re-arms the next request first, then runs one combined pass without
//! biometrics. If the lease runs out before the pass finishes, the pass is
//! cancelled, the lease is reported as failed and the status shows the
//! expiry. Anything the pass already queued stays queued.

use crate::sync::settings::SyncConfiguration;
use crate::sync::status::StatusHandle;
use crate::sync::{ExecutionContext, PassOutcome, PassRunner, SyncKind};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Time kept in reserve before the host's deadline.
pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::from_secs(5);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GrantError {
    #[error("Grant request rejected: {0}")]
    Rejected(String),
    #[error("Background execution unavailable")]
    Unavailable,
}

/// A request for a future execution window.
#[derive(Debug, Clone, PartialEq)]
pub struct GrantRequest {
    pub id: Uuid,
    pub not_before: Duration,
    pub earliest: Instant,
}

impl GrantRequest {
    pub fn new(not_before: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            not_before,
            earliest: Instant::now() + not_before,
        }
    }
}

/// A granted window, valid until `deadline`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionGrant {
    pub id: Uuid,
    pub deadline: Instant,
}

impl ExecutionGrant {
    pub fn new(id: Uuid, window: Duration) -> Self {
        Self {
            id,
            deadline: Instant::now() + window,
        }
    }
}

/// Whatever hands out execution windows.
pub trait GrantHost: Send + Sync {
    /// Ask for a window no earlier than `request.earliest`. A newer request
    /// replaces a pending one.
    fn submit(&self, request: GrantRequest) -> Result<(), GrantError>;

    /// Report that the window `grant` is finished.
    fn complete(&self, grant: Uuid, success: bool);
}

#[derive(Debug, Clone, PartialEq)]
pub enum LeaseState {
    Idle,
    Requested { request: Uuid, not_before: Duration },
    Running { grant: Uuid, deadline: Instant },
    Completed { grant: Uuid, success: bool },
    Expired { grant: Uuid },
}

#[derive(Debug, Clone, PartialEq)]
pub enum GrantOutcome {
    Completed(PassOutcome),
    Expired,
}

pub struct BackgroundCoordinator {
    host: Arc<dyn GrantHost>,
    runner: Arc<dyn PassRunner>,
    config: watch::Receiver<SyncConfiguration>,
    status: StatusHandle,
    state: watch::Sender<LeaseState>,
    expiry: Notify,
    safety_margin: Duration,
}

impl BackgroundCoordinator {
    pub fn new(
        host: Arc<dyn GrantHost>,
        runner: Arc<dyn PassRunner>,
        config: watch::Receiver<SyncConfiguration>,
        status: StatusHandle,
    ) -> Self {
        let (state, _) = watch::channel(LeaseState::Idle);
        Self {
            host,
            runner,
            config,
            status,
            state,
            expiry: Notify::new(),
            safety_margin: DEFAULT_SAFETY_MARGIN,
        }
    }

    pub fn with_safety_margin(mut self, margin: Duration) -> Self {
        self.safety_margin = margin;
        self
    }

    pub fn state(&self) -> LeaseState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<LeaseState> {
        self.state.subscribe()
    }

    /// Submit a request for the next window, due after the shorter of the
    /// two configured intervals.
    pub fn request_grant(&self) -> Result<GrantRequest, GrantError> {
        let not_before = self.config.borrow().shortest_interval();
        let request = GrantRequest::new(not_before);
        self.host.submit(request.clone())?;

        self.state.send_if_modified(|state| {
            if matches!(state, LeaseState::Running { .. }) {
                return false;
            }
            *state = LeaseState::Requested {
                request: request.id,
                not_before,
            };
            true
        });
        info!(minutes = not_before.as_secs() / 60, "background window requested");
        Ok(request)
    }

    /// Run one granted window to completion or expiry.
    pub async fn on_granted(&self, grant: ExecutionGrant) -> GrantOutcome {
        // Registered before `Running` is visible so an early `expire` is not lost.
        let expiry = self.expiry.notified();
        tokio::pin!(expiry);
        expiry.as_mut().enable();

        self.state.send_replace(LeaseState::Running {
            grant: grant.id,
            deadline: grant.deadline,
        });
        if let Err(e) = self.request_grant() {
            warn!(error = %e, "could not re-arm background window");
        }

        let budget_end = grant
            .deadline
            .checked_sub(self.safety_margin)
            .unwrap_or(grant.deadline);
        let pass = self
            .runner
            .run_pass(SyncKind::Combined, ExecutionContext::Background);

        tokio::select! {
            outcome = pass => {
                let success = outcome.is_success();
                self.host.complete(grant.id, success);
                self.state.send_replace(LeaseState::Completed { grant: grant.id, success });
                debug!(success, "background window completed");
                GrantOutcome::Completed(outcome)
            }
            _ = tokio::time::sleep_until(budget_end) => self.expire_lease(grant.id),
            _ = &mut expiry => self.expire_lease(grant.id),
        }
    }

    /// The host revoked `grant` early.
    pub fn expire(&self, grant: Uuid) {
        let running = matches!(
            *self.state.borrow(),
            LeaseState::Running { grant: id, .. } if id == grant
        );
        if running {
            self.expiry.notify_waiters();
        }
    }

    fn expire_lease(&self, grant: Uuid) -> GrantOutcome {
        warn!(%grant, "background window expired; pass cancelled");
        self.state.send_replace(LeaseState::Expired { grant });
        self.status.set_error("Background window expired");
        self.host.complete(grant, false);
        GrantOutcome::Expired
    }
}

/// In-process grant host: grants every request once it is due, with a fixed
/// window length.
pub struct LocalGrantHost {
    requests: mpsc::UnboundedSender<GrantRequest>,
    completions: Mutex<Vec<(Uuid, bool)>>,
}

impl LocalGrantHost {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<GrantRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let host = Self {
            requests: tx,
            completions: Mutex::new(Vec::new()),
        };
        (host, rx)
    }

    pub fn completions(&self) -> Vec<(Uuid, bool)> {
        match self.completions.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Grant requests as they come due until the host is dropped.
    pub async fn run(
        coordinator: Arc<BackgroundCoordinator>,
        mut requests: mpsc::UnboundedReceiver<GrantRequest>,
        window: Duration,
    ) {
        let Some(mut pending) = requests.recv().await else {
            return;
        };
        loop {
            tokio::select! {
                newer = requests.recv() => match newer {
                    Some(request) => {
                        pending = request;
                        continue;
                    }
                    None => return,
                },
                _ = tokio::time::sleep_until(pending.earliest) => {}
            }

            let outcome = coordinator
                .on_granted(ExecutionGrant::new(pending.id, window))
                .await;
            debug!(?outcome, "local grant finished");

            pending = match requests.recv().await {
                Some(request) => request,
                None => return,
            };
        }
    }
}

impl GrantHost for LocalGrantHost {
    fn submit(&self, request: GrantRequest) -> Result<(), GrantError> {
        self.requests
            .send(request)
            .map_err(|_| GrantError::Unavailable)
    }

    fn complete(&self, grant: Uuid, success: bool) {
        match self.completions.lock() {
            Ok(mut guard) => guard.push((grant, success)),
            Err(poisoned) => poisoned.into_inner().push((grant, success)),
        }
    }
}
