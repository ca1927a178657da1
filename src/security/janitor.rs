//! Background eviction of idle rate-limit keys.
//!
//! # Responsibilities
//! - Periodically evict counters idle for more than two windows
//! - Stop on request, with a bounded grace period before aborting
//!
//! # Design Decisions
//! - Each pass runs on the blocking pool: request tasks never wait on it,
//!   and a panicking pass is logged without ending the schedule
//! - Eviction races with admission checks are benign: a key recreated
//!   during a pass is simply evicted on a later one

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, MissedTickBehavior};

use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::security::window::WindowStore;

/// Time between eviction passes.
pub const JANITOR_PERIOD: Duration = Duration::from_secs(120);

/// Default wait for a running pass to finish on shutdown.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum JanitorError {
    #[error("janitor task panicked: {0}")]
    Panicked(#[source] JoinError),
    #[error("janitor task could not be cancelled: {0}")]
    Cancel(#[source] JoinError),
}

/// Eviction routine run by each pass; returns the number of evicted keys.
type Sweep = fn(&WindowStore, Instant) -> usize;

/// Periodic eviction task over a shared [`WindowStore`].
pub struct Janitor {
    store: Arc<WindowStore>,
    period: Duration,
    sweep: Sweep,
}

impl Janitor {
    pub fn new(store: Arc<WindowStore>) -> Self {
        Self {
            store,
            period: JANITOR_PERIOD,
            sweep: WindowStore::evict_idle,
        }
    }

    /// Override the pass period.
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    #[cfg(test)]
    fn with_sweep(mut self, sweep: Sweep) -> Self {
        self.sweep = sweep;
        self
    }

    /// Spawn the janitor onto the current runtime.
    pub fn spawn(self) -> JanitorHandle {
        let stop = Shutdown::new();
        let task = tokio::spawn(self.run(stop.subscribe()));
        JanitorHandle { stop, task }
    }

    async fn run(self, mut stop: broadcast::Receiver<()>) {
        tracing::info!(period_secs = self.period.as_secs(), "Janitor starting");

        // First pass after one full period.
        let mut ticker = time::interval_at(time::Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.pass().await;
                }
                _ = stop.recv() => {
                    tracing::info!("Janitor received stop signal, exiting loop");
                    break;
                }
            }
        }
    }

    async fn pass(&self) {
        let store = self.store.clone();
        let sweep = self.sweep;
        let result = tokio::task::spawn_blocking(move || {
            let evicted = sweep(&store, Instant::now());
            (evicted, store.len())
        })
        .await;

        match result {
            Ok((evicted, remaining)) => {
                metrics::record_evicted(evicted);
                metrics::record_tracked_keys(remaining);
                tracing::debug!(evicted, remaining, "Janitor pass completed");
            }
            Err(e) => {
                tracing::error!(error = %e, "Janitor pass failed");
            }
        }
    }
}

/// Handle to a running janitor.
pub struct JanitorHandle {
    stop: Shutdown,
    task: JoinHandle<()>,
}

impl JanitorHandle {
    /// Signal the janitor to stop, wait up to `grace`, then abort it.
    pub async fn shutdown(mut self, grace: Duration) -> Result<(), JanitorError> {
        self.stop.trigger();

        match time::timeout(grace, &mut self.task).await {
            Ok(Ok(())) => {
                tracing::info!("Janitor stopped");
                Ok(())
            }
            Ok(Err(e)) if e.is_cancelled() => Ok(()),
            Ok(Err(e)) => Err(JanitorError::Panicked(e)),
            Err(_) => {
                tracing::warn!(
                    grace_ms = grace.as_millis() as u64,
                    "Janitor did not stop in time, aborting"
                );
                self.task.abort();
                match self.task.await {
                    Ok(()) => Ok(()),
                    Err(e) if e.is_cancelled() => Ok(()),
                    Err(e) => Err(JanitorError::Cancel(e)),
                }
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
