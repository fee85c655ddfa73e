//! Progress simulator: walks packages toward delivery in the background
//!
//! One task per tracking code, owned by a registry so a code is never
//! simulated twice and every task can be cancelled. Each step sleeps for a
//! random delay and then goes through the same lifecycle path as a manual
//! update, recorded under the automated-system actor.

use crate::domain::package::StatusUpdate;
use crate::domain::tracking_code::SharedRng;
use crate::domain::types::{PackageStatus, TrackingCode, AUTOMATED_ACTOR, AUTOMATED_NOTE};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::services::lifecycle::{LifecycleError, PackageLifecycle};
use rand::Rng;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Delay range and branch probability for simulated steps
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationSettings {
    pub min_delay: Duration,
    /// Exclusive upper bound
    pub max_delay: Duration,
    pub delivery_probability: f64,
}

impl SimulationSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_delay: config.sim_min_delay(),
            max_delay: config.sim_max_delay(),
            delivery_probability: config.delivery_probability(),
        }
    }
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Next simulated status; `None` once the package is terminal
///
/// OUT_FOR_DELIVERY ends in DELIVERED with `delivery_probability`, RETURNED
/// otherwise.
pub fn next_status<R: Rng + ?Sized>(
    current: PackageStatus,
    rng: &mut R,
    delivery_probability: f64,
) -> Option<PackageStatus> {
    match current {
        PackageStatus::Registered => Some(PackageStatus::Warehouse),
        PackageStatus::Warehouse => Some(PackageStatus::InTransit),
        PackageStatus::InTransit => Some(PackageStatus::OutForDistribution),
        PackageStatus::OutForDistribution => Some(PackageStatus::OutForDelivery),
        PackageStatus::OutForDelivery => {
            if rng.gen::<f64>() < delivery_probability {
                Some(PackageStatus::Delivered)
            } else {
                Some(PackageStatus::Returned)
            }
        }
        PackageStatus::Delivered | PackageStatus::Returned | PackageStatus::Lost => None,
    }
}

/// Uniform in `[min, max)`, or `min` when the range is empty
pub fn sample_delay<R: Rng + ?Sized>(rng: &mut R, min: Duration, max: Duration) -> Duration {
    let (lo, hi) = (min.as_millis() as u64, max.as_millis() as u64);
    if hi <= lo {
        return min;
    }
    Duration::from_millis(rng.gen_range(lo..hi))
}

/// Result of asking the simulator to start a code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
    /// Package already DELIVERED, RETURNED or LOST
    Terminal,
    NotFound,
}

struct SimTask {
    generation: u64,
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct SimInner {
    lifecycle: Arc<PackageLifecycle>,
    rng: SharedRng,
    settings: SimulationSettings,
    metrics: Arc<Metrics>,
    tasks: parking_lot::Mutex<FxHashMap<TrackingCode, SimTask>>,
    next_generation: AtomicU64,
}

impl SimInner {
    /// Remove the registry entry if it still belongs to this run
    fn finish(&self, code: &TrackingCode, generation: u64) {
        let mut tasks = self.tasks.lock();
        if tasks.get(code).is_some_and(|t| t.generation == generation) {
            tasks.remove(code);
        }
    }
}

/// Cloneable handle to the simulator registry
#[derive(Clone)]
pub struct ProgressSimulator {
    inner: Arc<SimInner>,
}

impl ProgressSimulator {
    pub fn new(
        lifecycle: Arc<PackageLifecycle>,
        rng: SharedRng,
        settings: SimulationSettings,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            inner: Arc::new(SimInner {
                lifecycle,
                rng,
                settings,
                metrics,
                tasks: parking_lot::Mutex::new(FxHashMap::default()),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Start simulating `code` unless it is terminal, missing or already running
    pub async fn start(&self, code: &TrackingCode) -> Result<StartOutcome, LifecycleError> {
        let package = match self.inner.lifecycle.find_by_tracking_code(code).await {
            Ok(package) => package,
            Err(LifecycleError::PackageNotFound(_)) => return Ok(StartOutcome::NotFound),
            Err(e) => return Err(e),
        };
        if package.is_terminal() {
            debug!(tracking_code = %code, status = %package.status, "simulation_skipped_terminal");
            return Ok(StartOutcome::Terminal);
        }

        let mut tasks = self.inner.tasks.lock();
        if tasks.get(code).is_some_and(|t| !t.handle.is_finished()) {
            return Ok(StartOutcome::AlreadyRunning);
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let (cancel, cancel_rx) = watch::channel(false);
        let inner = self.inner.clone();
        let task_code = code.clone();
        let handle = tokio::spawn(async move {
            run_simulation(&inner, &task_code, cancel_rx).await;
            inner.finish(&task_code, generation);
            inner.metrics.record_simulation_finished();
        });
        tasks.insert(code.clone(), SimTask { generation, cancel, handle });

        self.inner.metrics.record_simulation_started();
        info!(tracking_code = %code, status = %package.status, "simulation_started");
        Ok(StartOutcome::Started)
    }

    /// Stop the task for `code`. Returns false if none was running.
    pub fn cancel(&self, code: &TrackingCode) -> bool {
        let Some(task) = self.inner.tasks.lock().remove(code) else {
            return false;
        };
        let _ = task.cancel.send(true);
        info!(tracking_code = %code, "simulation_cancel_requested");
        true
    }

    pub fn is_running(&self, code: &TrackingCode) -> bool {
        self.inner.tasks.lock().get(code).is_some_and(|t| !t.handle.is_finished())
    }

    pub fn active_count(&self) -> usize {
        self.inner.tasks.lock().values().filter(|t| !t.handle.is_finished()).count()
    }

    /// Cancel every task and wait for all of them to exit
    pub async fn shutdown(&self) {
        let drained: Vec<_> = self.inner.tasks.lock().drain().collect();
        let count = drained.len();
        for (_, task) in &drained {
            let _ = task.cancel.send(true);
        }
        for (code, task) in drained {
            if let Err(e) = task.handle.await {
                warn!(tracking_code = %code, error = %e, "simulation_task_join_failed");
            }
        }
        info!(cancelled = count, "simulator_shutdown");
    }
}

async fn run_simulation(
    inner: &SimInner,
    code: &TrackingCode,
    mut cancel_rx: watch::Receiver<bool>,
) {
    let settings = inner.settings;
    loop {
        if *cancel_rx.borrow() {
            info!(tracking_code = %code, "simulation_cancelled");
            return;
        }

        let package = match inner.lifecycle.find_by_tracking_code(code).await {
            Ok(package) => package,
            Err(LifecycleError::PackageNotFound(_)) => {
                warn!(tracking_code = %code, "simulation_package_missing");
                return;
            }
            Err(e) => {
                error!(tracking_code = %code, error = %e, "simulation_load_failed");
                return;
            }
        };

        let Some(next) =
            inner.rng.with(|rng| next_status(package.status, rng, settings.delivery_probability))
        else {
            info!(tracking_code = %code, status = %package.status, "simulation_completed");
            return;
        };
        let delay =
            inner.rng.with(|rng| sample_delay(rng, settings.min_delay, settings.max_delay));
        debug!(
            tracking_code = %code,
            next = %next,
            delay_ms = delay.as_millis() as u64,
            "simulation_step_scheduled"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel_rx.changed() => {
                info!(tracking_code = %code, "simulation_cancelled");
                return;
            }
        }

        let update = StatusUpdate {
            status: next,
            updated_by: AUTOMATED_ACTOR.to_string(),
            notes: Some(AUTOMATED_NOTE.to_string()),
            location: None,
        };
        match inner.lifecycle.apply_status_change(code, update).await {
            Ok(updated) => {
                info!(
                    tracking_code = %code,
                    from = %package.status,
                    to = %updated.status,
                    location = %updated.current_location,
                    "simulation_step"
                );
            }
            // Someone else moved the package meanwhile; re-read and continue
            Err(LifecycleError::InvalidTransition(e)) => {
                warn!(tracking_code = %code, from = %e.from, to = %e.to, "simulation_step_rejected");
            }
            Err(e) => {
                error!(tracking_code = %code, error = %e, "simulation_step_failed");
                return;
            }
        }
    }
}
