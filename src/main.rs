//! Parcel tracker - package lifecycle service
//!
//! Registers packages, enforces the status transition graph, fans lifecycle
//! events out to notification handlers and streams status updates over SSE.
//!
//! Module structure:
//! - `domain/` - Core business types (Package, statuses, transitions, ports)
//! - `io/` - External interfaces (HTTP API, SSE, Prometheus)
//! - `services/` - Business logic (Lifecycle, EventBus, Simulator, UpdateStream)
//! - `infra/` - Infrastructure (Config, Metrics, in-memory stores)

use clap::Parser;
use parcel_tracker::app;
use parcel_tracker::infra::Config;
use parcel_tracker::io::start_http_server;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Parcel tracker - package registration, status tracking and notifications
#[derive(Parser, Debug)]
#[command(name = "parcel-tracker", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "CONFIG_FILE", default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default: INFO, use RUST_LOG=debug for per-request visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let version = format!("{} ({})", env!("CARGO_PKG_VERSION"), env!("GIT_HASH"));
    info!(version = %version, "parcel-tracker starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        bind_address = %config.http_bind_address(),
        port = %config.http_port(),
        event_buffer = %config.event_buffer_size(),
        event_workers = %config.event_workers(),
        sim_min_delay_ms = %config.sim_min_delay().as_millis(),
        sim_max_delay_ms = %config.sim_max_delay().as_millis(),
        delivery_probability = %config.delivery_probability(),
        seeded = config.rng_seed().is_some(),
        employees = config.employees().len(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let (state, dispatcher) = app::build(&config, version);
    let dispatcher_task = tokio::spawn(dispatcher.run());

    // Periodic metrics summary
    let reporter_state = state.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            let running = reporter_state.simulator.active_count();
            reporter_state.metrics.report(running).log();
        }
    });

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    let server_result = start_http_server(
        config.http_bind_address(),
        config.http_port(),
        state.clone(),
        shutdown_rx,
    )
    .await;
    if let Err(e) = &server_result {
        error!(error = %e, "http_server_error");
    }

    state.simulator.shutdown().await;
    // Background tasks still hold bus senders, so give queued events a moment
    if tokio::time::timeout(Duration::from_millis(500), dispatcher_task).await.is_err() {
        info!("event_dispatcher_stopped_with_runtime");
    }

    info!("parcel-tracker shutdown complete");
    server_result
}
