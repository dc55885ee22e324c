//! Cron trigger for the reconciliation engine.
//!
//! The scheduler is an explicit instance: it owns the trigger task, the
//! overlap flag and the last-run snapshot. Scheduled fires are guarded so a
//! slow run is never overlapped by the next fire. [`ReconciliationScheduler::run_once`]
//! is deliberately unguarded; compare-and-set updates keep a manual run that
//! races a scheduled one harmless.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use croner::Cron;
use parking_lot::Mutex;
use tokio::sync::{Notify, watch};
use tracing::{debug, error, info, warn};

use crate::config::ReconcileConfig;
use crate::engine::{ReconciliationEngine, RunOptions};
use crate::error::ScheduleError;
use crate::stats::RunStats;

/// Parsed cron expression bound to a timezone.
#[derive(Debug, Clone)]
pub struct Schedule {
    expression: String,
    cron: Cron,
    timezone: Tz,
}

impl Schedule {
    pub fn parse(expression: &str, timezone: &str) -> Result<Self, ScheduleError> {
        let cron = Cron::new(expression)
            .parse()
            .map_err(|e| ScheduleError::InvalidCron {
                expression: expression.to_string(),
                message: e.to_string(),
            })?;
        let timezone: Tz = timezone
            .trim()
            .parse()
            .map_err(|_| ScheduleError::InvalidTimezone(timezone.to_string()))?;

        Ok(Self {
            expression: expression.to_string(),
            cron,
            timezone,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// First fire strictly after `instant`, in the schedule's timezone.
    pub fn next_after<Z: chrono::TimeZone>(
        &self,
        instant: &DateTime<Z>,
    ) -> Result<DateTime<Tz>, ScheduleError> {
        let local = instant.with_timezone(&self.timezone);
        self.cron
            .find_next_occurrence(&local, false)
            .map_err(|_| ScheduleError::Exhausted(self.expression.clone()))
    }

    /// The next `count` fires after `instant`.
    pub fn upcoming<Z: chrono::TimeZone>(
        &self,
        instant: &DateTime<Z>,
        count: usize,
    ) -> Result<Vec<DateTime<Tz>>, ScheduleError> {
        let mut fires = Vec::with_capacity(count);
        let mut cursor = instant.with_timezone(&self.timezone);
        for _ in 0..count {
            cursor = self.next_after(&cursor)?;
            fires.push(cursor);
        }
        Ok(fires)
    }

    pub fn upcoming_from_now(&self, count: usize) -> Result<Vec<DateTime<Tz>>, ScheduleError> {
        self.upcoming(&Utc::now(), count)
    }
}

/// State shared between the scheduler handle and its spawned tasks.
struct Shared {
    engine: Arc<ReconciliationEngine>,
    running: AtomicBool,
    idle: Notify,
    last_run: ArcSwapOption<RunStats>,
}

impl Shared {
    fn try_acquire(self: &Arc<Self>) -> Option<RunGuard> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(Arc::clone(self)))
    }

    async fn execute(&self, options: &RunOptions) -> RunStats {
        let stats = self.engine.run_once(options).await;
        self.last_run.store(Some(Arc::new(stats.clone())));
        stats
    }

    /// Spawn a scheduled run unless one is already in flight.
    fn fire(self: &Arc<Self>) {
        let Some(guard) = self.try_acquire() else {
            warn!("Previous payment reconciliation run still in progress, skipping fire");
            return;
        };

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = guard;
            shared.execute(&RunOptions::default()).await;
        });
    }
}

/// Clears the overlap flag when a guarded run ends, even by panic.
struct RunGuard(Arc<Shared>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::Release);
        self.0.idle.notify_waiters();
    }
}

pub struct ReconciliationScheduler {
    shared: Arc<Shared>,
    schedule: Schedule,
    startup_delay: Option<Duration>,
    trigger: Mutex<Option<watch::Sender<bool>>>,
}

impl ReconciliationScheduler {
    /// Validates the cron expression and timezone from `config`.
    pub fn new(
        engine: Arc<ReconciliationEngine>,
        config: &ReconcileConfig,
    ) -> Result<Self, ScheduleError> {
        let schedule = Schedule::parse(&config.cron, &config.timezone)?;
        Ok(Self {
            shared: Arc::new(Shared {
                engine,
                running: AtomicBool::new(false),
                idle: Notify::new(),
                last_run: ArcSwapOption::empty(),
            }),
            schedule,
            startup_delay: config.run_on_startup.then(|| config.startup_delay()),
            trigger: Mutex::new(None),
        })
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Register the periodic trigger. Returns `false` if already started.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> bool {
        let mut trigger = self.trigger.lock();
        if trigger.is_some() {
            warn!("Payment reconciliation scheduler already started");
            return false;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(trigger_loop(
            Arc::clone(&self.shared),
            self.schedule.clone(),
            self.startup_delay,
            shutdown_rx,
        ));
        *trigger = Some(shutdown_tx);
        true
    }

    /// Deregister the periodic trigger. An in-flight run keeps going.
    pub fn stop(&self) -> bool {
        match self.trigger.lock().take() {
            Some(shutdown) => {
                let _ = shutdown.send(true);
                true
            }
            None => false,
        }
    }

    pub fn is_started(&self) -> bool {
        self.trigger.lock().is_some()
    }

    /// Whether a guarded (scheduled or `try_run_once`) run is in flight.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Run one pass now, regardless of any scheduled run in flight.
    pub async fn run_once(&self, options: &RunOptions) -> RunStats {
        self.shared.execute(options).await
    }

    /// Run one pass now unless a guarded run is already in flight.
    pub async fn try_run_once(&self, options: &RunOptions) -> Option<RunStats> {
        let _guard = self.shared.try_acquire()?;
        Some(self.shared.execute(options).await)
    }

    /// Stats of the most recently completed run.
    pub fn last_run(&self) -> Option<Arc<RunStats>> {
        self.shared.last_run.load_full()
    }

    /// Wait until no guarded run is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            if !self.is_running() {
                return;
            }
            notified.await;
        }
    }

    pub fn next_fire_after<Z: chrono::TimeZone>(
        &self,
        instant: &DateTime<Z>,
    ) -> Result<DateTime<Tz>, ScheduleError> {
        self.schedule.next_after(instant)
    }

    /// The next `count` fires from now.
    pub fn upcoming(&self, count: usize) -> Result<Vec<DateTime<Tz>>, ScheduleError> {
        self.schedule.upcoming_from_now(count)
    }
}

impl Drop for ReconciliationScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn trigger_loop(
    shared: Arc<Shared>,
    schedule: Schedule,
    startup_delay: Option<Duration>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(
        cron = %schedule.expression(),
        timezone = %schedule.timezone(),
        "Payment reconciliation scheduler started"
    );

    if let Some(delay) = startup_delay {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                info!("Running startup payment reconciliation");
                shared.fire();
            }
            _ = shutdown.changed() => {
                info!("Payment reconciliation scheduler stopped");
                return;
            }
        }
    }

    let mut last_fire: Option<DateTime<Tz>> = None;
    loop {
        let now = Utc::now().with_timezone(&schedule.timezone());
        // Never compute from before the previous fire, or an early wakeup
        // would fire the same slot twice.
        let from = match last_fire {
            Some(previous) if previous > now => previous,
            _ => now,
        };
        let next = match schedule.next_after(&from) {
            Ok(next) => next,
            Err(e) => {
                error!(error = %e, "No further payment reconciliation fires");
                break;
            }
        };
        let wait = (next - now).to_std().unwrap_or_default();
        debug!(next_fire = %next, wait_secs = wait.as_secs(), "Next payment reconciliation scheduled");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                last_fire = Some(next);
                shared.fire();
            }
            _ = shutdown.changed() => break,
        }
    }

    info!("Payment reconciliation scheduler stopped");
}
