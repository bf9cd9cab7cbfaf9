//! Periodic refresh of due sources.
//!
//! [`RefreshScheduler`] is an explicitly constructed service: the binary owns
//! one, tests build as many isolated instances as they like. Each running
//! scheduler is a single Tokio task driven by an interval timer; stopping it
//! signals the task through a watch channel, so a cycle already in flight
//! completes and only future ticks are cancelled.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::feed::{BulkRefreshOutcome, SyncEngine, SyncError};

/// Snapshot returned by [`RefreshScheduler::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub is_running: bool,
    /// Interval of the running scheduler; `None` while stopped.
    pub check_interval_minutes: Option<u32>,
    /// When the most recent cycle (periodic or manual) finished.
    pub last_cycle_at: Option<DateTime<Utc>>,
}

struct RunningTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
    check_interval_minutes: u32,
}

#[derive(Default)]
struct SchedulerState {
    running: Option<RunningTask>,
    last_cycle_at: Option<DateTime<Utc>>,
}

/// Drives [`SyncEngine::refresh_all_feeds`] on a fixed interval.
///
/// Stopped → `start` → Running → `stop` → Stopped.
pub struct RefreshScheduler {
    engine: Arc<SyncEngine>,
    state: Arc<Mutex<SchedulerState>>,
}

impl RefreshScheduler {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self {
            engine,
            state: Arc::new(Mutex::new(SchedulerState::default())),
        }
    }

    /// Start refreshing every `check_interval_minutes`, with one cycle right away.
    ///
    /// Returns `false` (and logs a warning) if already running. Must be
    /// called from within a Tokio runtime.
    pub fn start(&self, check_interval_minutes: u32) -> bool {
        let period = Duration::from_secs(u64::from(check_interval_minutes.max(1)) * 60);
        self.start_every(period, check_interval_minutes)
    }

    pub(crate) fn start_every(&self, period: Duration, check_interval_minutes: u32) -> bool {
        let mut state = lock(&self.state);
        if state.running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            tracing::warn!("Refresh scheduler already running");
            return false;
        }

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let engine = Arc::clone(&self.engine);
        let task_state = Arc::clone(&self.state);

        let handle = tokio::spawn(async move {
            // First tick fires immediately
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                // Shutdown is polled first so a tick that came due during a
                // long cycle cannot start another one after `stop`
                tokio::select! {
                    biased;

                    _ = shutdown_rx.changed() => break,
                    _ = interval.tick() => {
                        // Logged and swallowed: a failed cycle must not end the loop
                        if let Err(e) = run_cycle(&engine, &task_state).await {
                            tracing::error!(error = %e, "Scheduled refresh cycle failed");
                        }
                    }
                }
            }

            tracing::debug!("Refresh scheduler task exited");
        });

        state.running = Some(RunningTask {
            shutdown,
            handle,
            check_interval_minutes,
        });
        tracing::info!(check_interval_minutes, "Refresh scheduler started");
        true
    }

    /// Cancel future cycles. Returns `false` (and logs a warning) if already stopped.
    pub fn stop(&self) -> bool {
        let Some(running) = lock(&self.state).running.take() else {
            tracing::warn!("Refresh scheduler already stopped");
            return false;
        };

        // The receiver may already be gone if the task panicked
        let _ = running.shutdown.send(true);
        tracing::info!("Refresh scheduler stopped");
        true
    }

    /// Run one refresh cycle now, independent of start/stop.
    ///
    /// Each source's own cadence decides what is due. Errors from selecting
    /// due sources propagate to the caller.
    pub async fn run_refresh_cycle(&self) -> Result<BulkRefreshOutcome, SyncError> {
        run_cycle(&self.engine, &self.state).await
    }

    pub fn status(&self) -> SchedulerStatus {
        let state = lock(&self.state);
        let running = state.running.as_ref().filter(|r| !r.handle.is_finished());

        SchedulerStatus {
            is_running: running.is_some(),
            check_interval_minutes: running.map(|r| r.check_interval_minutes),
            last_cycle_at: state.last_cycle_at,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status().is_running
    }
}

fn lock(state: &Mutex<SchedulerState>) -> MutexGuard<'_, SchedulerState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

async fn run_cycle(
    engine: &SyncEngine,
    state: &Mutex<SchedulerState>,
) -> Result<BulkRefreshOutcome, SyncError> {
    let result = engine.refresh_all_feeds(None).await;
    lock(state).last_cycle_at = Some(Utc::now());

    let outcome = result?;
    if !outcome.failed.is_empty() {
        let failed: Vec<String> = outcome
            .failed
            .iter()
            .map(|f| format!("{}: {}", f.source_id, f.error))
            .collect();
        tracing::warn!(
            failed = outcome.failed.len(),
            sources = %failed.join("; "),
            "Some sources failed to refresh"
        );
    }
    tracing::info!(
        total = outcome.total,
        successful = outcome.successful,
        new_items = outcome.new_items_count,
        "Refresh cycle complete"
    );

    Ok(outcome)
}
