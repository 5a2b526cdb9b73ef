//! Interval scheduler.
//!
//! Keeps one repeating trigger per [`MetricClass`]. A trigger's fire times
//! are `anchor + k * period`; rescheduling with an unchanged period keeps the
//! anchor, so repeated reschedules with the same configuration do not move
//! any fire time. Each fire spawns its pass on a separate task, so a slow
//! pass never delays the cadence of either class.

use crate::sync::settings::SyncConfiguration;
use crate::sync::{ExecutionContext, MetricClass, PassRunner};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

struct Trigger {
    period: Duration,
    anchor: Instant,
    task: JoinHandle<()>,
}

pub struct IntervalScheduler {
    runner: Arc<dyn PassRunner>,
    context: ExecutionContext,
    triggers: Mutex<HashMap<MetricClass, Trigger>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl IntervalScheduler {
    /// Scheduler whose passes run with foreground time.
    pub fn new(runner: Arc<dyn PassRunner>) -> Self {
        Self::with_context(runner, ExecutionContext::Foreground)
    }

    pub fn with_context(runner: Arc<dyn PassRunner>, context: ExecutionContext) -> Self {
        Self {
            runner,
            context,
            triggers: Mutex::new(HashMap::new()),
            watcher: Mutex::new(None),
        }
    }

    /// Arm both triggers from `config`.
    ///
    /// Triggers whose period is unchanged keep running untouched; changed
    /// ones are cancelled and re-armed from now. In-flight passes are not
    /// affected either way.
    pub fn reschedule(&self, config: &SyncConfiguration) {
        let mut triggers = lock(&self.triggers);
        for class in MetricClass::ALL {
            let period = class.interval(config);
            if let Some(existing) = triggers.get(&class) {
                if existing.period == period && !existing.task.is_finished() {
                    continue;
                }
                existing.task.abort();
            }

            let anchor = Instant::now();
            let task = self.spawn_trigger(class, anchor, period);
            triggers.insert(
                class,
                Trigger {
                    period,
                    anchor,
                    task,
                },
            );
            info!(%class, minutes = period.as_secs() / 60, "trigger armed");
        }
    }

    /// Next time the trigger for `class` fires, if armed.
    pub fn next_fire(&self, class: MetricClass) -> Option<Instant> {
        let triggers = lock(&self.triggers);
        let trigger = triggers.get(&class)?;
        let elapsed = Instant::now().saturating_duration_since(trigger.anchor);
        let periods = elapsed.as_nanos() / trigger.period.as_nanos().max(1) + 1;
        let offset = trigger.period.checked_mul(u32::try_from(periods).ok()?)?;
        Some(trigger.anchor + offset)
    }

    /// Current period of the trigger for `class`, if armed.
    pub fn period(&self, class: MetricClass) -> Option<Duration> {
        lock(&self.triggers).get(&class).map(|t| t.period)
    }

    /// Arm from the current configuration and re-arm on every change.
    pub fn watch(self: &Arc<Self>, mut config: watch::Receiver<SyncConfiguration>) {
        let initial = config.borrow_and_update().clone();
        self.reschedule(&initial);

        let weak: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            while config.changed().await.is_ok() {
                let Some(scheduler) = weak.upgrade() else {
                    break;
                };
                let next = config.borrow_and_update().clone();
                debug!("configuration changed; rescheduling");
                scheduler.reschedule(&next);
            }
        });

        if let Some(previous) = lock(&self.watcher).replace(handle) {
            previous.abort();
        }
    }

    /// Cancel both triggers and stop watching the configuration.
    pub fn stop(&self) {
        if let Some(watcher) = lock(&self.watcher).take() {
            watcher.abort();
        }
        for (_, trigger) in lock(&self.triggers).drain() {
            trigger.task.abort();
        }
    }

    fn spawn_trigger(&self, class: MetricClass, anchor: Instant, period: Duration) -> JoinHandle<()> {
        let runner = Arc::clone(&self.runner);
        let context = self.context;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(anchor + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                debug!(%class, "trigger fired");
                let runner = Arc::clone(&runner);
                tokio::spawn(async move {
                    let outcome = runner.run_pass(class.kind(), context).await;
                    debug!(%class, ?outcome, "pass finished");
                });
            }
        })
    }
}

impl Drop for IntervalScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{PassOutcome, SkipReason, SyncKind};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingRunner {
        location: AtomicUsize,
        biometric: AtomicUsize,
    }

    #[async_trait]
    impl PassRunner for CountingRunner {
        async fn run_pass(&self, kind: SyncKind, _context: ExecutionContext) -> PassOutcome {
            match kind {
                SyncKind::Location => self.location.fetch_add(1, Ordering::SeqCst),
                _ => self.biometric.fetch_add(1, Ordering::SeqCst),
            };
            PassOutcome::Skipped(SkipReason::Busy)
        }
    }

    fn config(location_minutes: u64, biometric_minutes: u64) -> SyncConfiguration {
        SyncConfiguration {
            location_interval: Duration::from_secs(location_minutes * 60),
            biometric_interval: Duration::from_secs(biometric_minutes * 60),
            ..SyncConfiguration::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_is_idempotent() {
        let scheduler = IntervalScheduler::new(Arc::new(CountingRunner::default()));
        let c = config(5, 180);

        scheduler.reschedule(&c);
        let first = (
            scheduler.next_fire(MetricClass::Location).unwrap(),
            scheduler.next_fire(MetricClass::Biometric).unwrap(),
        );

        tokio::time::advance(Duration::from_secs(7)).await;
        scheduler.reschedule(&c);
        let second = (
            scheduler.next_fire(MetricClass::Location).unwrap(),
            scheduler.next_fire(MetricClass::Biometric).unwrap(),
        );
        assert_eq!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_changed_interval_rearms_from_now() {
        let scheduler = IntervalScheduler::new(Arc::new(CountingRunner::default()));
        scheduler.reschedule(&config(5, 180));
        let biometric_before = scheduler.next_fire(MetricClass::Biometric).unwrap();

        tokio::time::advance(Duration::from_secs(60)).await;
        scheduler.reschedule(&config(10, 180));

        let now = Instant::now();
        assert_eq!(
            scheduler.next_fire(MetricClass::Location).unwrap(),
            now + Duration::from_secs(600)
        );
        assert_eq!(
            scheduler.next_fire(MetricClass::Biometric).unwrap(),
            biometric_before
        );
        assert_eq!(
            scheduler.period(MetricClass::Location),
            Some(Duration::from_secs(600))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_classes_fire_independently() {
        let runner = Arc::new(CountingRunner::default());
        let scheduler = IntervalScheduler::new(runner.clone());
        scheduler.reschedule(&config(5, 15));

        // Fires at 5, 10, 15, 20 minutes for location and 15 for biometric.
        tokio::time::sleep(Duration::from_secs(20 * 60 + 30)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(runner.location.load(Ordering::SeqCst), 4);
        assert_eq!(runner.biometric.load(Ordering::SeqCst), 1);
        scheduler.stop();
        assert!(scheduler.next_fire(MetricClass::Location).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_follows_configuration_changes() {
        let scheduler = Arc::new(IntervalScheduler::new(Arc::new(CountingRunner::default())));
        let (tx, rx) = watch::channel(config(5, 180));
        scheduler.watch(rx);
        assert_eq!(
            scheduler.period(MetricClass::Location),
            Some(Duration::from_secs(300))
        );

        tx.send_replace(config(1, 60));
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(
            scheduler.period(MetricClass::Location),
            Some(Duration::from_secs(60))
        );
        assert_eq!(
            scheduler.period(MetricClass::Biometric),
            Some(Duration::from_secs(3600))
        );
    }
}
