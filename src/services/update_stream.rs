//! Polling update stream for one tracking code
//!
//! Opening a stream kicks off the simulator for the code (fire and forget)
//! and then relays a status snapshot every interval until the package is
//! terminal, the package disappears, the update cap is reached or the overall
//! timeout expires. Dropping the receiver stops polling at the next await.

use crate::domain::package::StatusSnapshot;
use crate::domain::types::TrackingCode;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::services::lifecycle::{LifecycleError, PackageLifecycle};
use crate::services::simulator::ProgressSimulator;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    pub interval: Duration,
    pub max_updates: u32,
    pub timeout: Duration,
}

impl StreamSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.stream_interval(),
            max_updates: config.stream_max_updates(),
            timeout: config.stream_timeout(),
        }
    }
}

/// Why a stream ended without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    Terminal,
    CapReached,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    Update(StatusSnapshot),
    /// Sent once, right before the channel closes
    Error(String),
    Completed(StreamEnd),
}

/// How the polling loop stopped
enum PollEnd {
    Done(StreamEnd),
    Failed,
    Disconnected,
}

#[derive(Clone)]
pub struct UpdateStream {
    lifecycle: Arc<PackageLifecycle>,
    simulator: ProgressSimulator,
    settings: StreamSettings,
    metrics: Arc<Metrics>,
}

impl UpdateStream {
    pub fn new(
        lifecycle: Arc<PackageLifecycle>,
        simulator: ProgressSimulator,
        settings: StreamSettings,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { lifecycle, simulator, settings, metrics }
    }

    /// Start polling `code`; messages arrive on the returned receiver
    pub fn open(&self, code: TrackingCode) -> mpsc::Receiver<StreamMessage> {
        let (tx, rx) = mpsc::channel(16);

        let simulator = self.simulator.clone();
        let sim_code = code.clone();
        tokio::spawn(async move {
            match simulator.start(&sim_code).await {
                Ok(outcome) => debug!(tracking_code = %sim_code, ?outcome, "stream_simulation_requested"),
                Err(e) => warn!(tracking_code = %sim_code, error = %e, "stream_simulation_start_failed"),
            }
        });

        let lifecycle = self.lifecycle.clone();
        let settings = self.settings;
        let metrics = self.metrics.clone();
        metrics.stream_opened();
        info!(tracking_code = %code, "stream_opened");

        tokio::spawn(async move {
            let end = match tokio::time::timeout(settings.timeout, poll(&lifecycle, &code, &tx, settings)).await {
                Ok(end) => end,
                Err(_) => PollEnd::Done(StreamEnd::TimedOut),
            };
            match end {
                PollEnd::Done(reason) => {
                    let _ = tx.send(StreamMessage::Completed(reason)).await;
                    info!(tracking_code = %code, reason = ?reason, "stream_completed");
                }
                PollEnd::Failed => info!(tracking_code = %code, "stream_failed"),
                PollEnd::Disconnected => info!(tracking_code = %code, "stream_disconnected"),
            }
            metrics.stream_closed();
        });

        rx
    }
}

async fn poll(
    lifecycle: &PackageLifecycle,
    code: &TrackingCode,
    tx: &mpsc::Sender<StreamMessage>,
    settings: StreamSettings,
) -> PollEnd {
    let mut sent = 0;
    while sent < settings.max_updates {
        tokio::select! {
            _ = tokio::time::sleep(settings.interval) => {}
            _ = tx.closed() => return PollEnd::Disconnected,
        }

        let package = match lifecycle.find_by_tracking_code(code).await {
            Ok(package) => package,
            Err(LifecycleError::PackageNotFound(_)) => {
                let _ = tx.send(StreamMessage::Error(format!("package not found: {code}"))).await;
                return PollEnd::Failed;
            }
            Err(e) => {
                error!(tracking_code = %code, error = %e, "stream_poll_failed");
                let _ = tx.send(StreamMessage::Error("internal error".to_string())).await;
                return PollEnd::Failed;
            }
        };

        if tx.send(StreamMessage::Update(package.snapshot())).await.is_err() {
            return PollEnd::Disconnected;
        }
        sent += 1;

        if package.is_terminal() {
            return PollEnd::Done(StreamEnd::Terminal);
        }
    }
    PollEnd::Done(StreamEnd::CapReached)
}
