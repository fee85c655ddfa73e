//! Service wiring shared by the binary and the integration tests

use crate::domain::tracking_code::{SharedRng, TrackingCodeGenerator};
use crate::infra::memory::{InMemoryEmployeeDirectory, InMemoryNotificationStore, InMemoryPackageStore};
use crate::infra::{Config, Metrics};
use crate::services::{
    create_event_bus, EventDispatcher, NotificationComposer, PackageLifecycle, ProgressSimulator,
    SimulationSettings, StreamSettings, UpdateStream,
};
use std::sync::Arc;

/// Everything a request handler needs
pub struct AppState {
    pub lifecycle: Arc<PackageLifecycle>,
    pub notifications: Arc<NotificationComposer>,
    pub simulator: ProgressSimulator,
    pub streams: UpdateStream,
    pub directory: InMemoryEmployeeDirectory,
    pub metrics: Arc<Metrics>,
    pub site_id: String,
    pub version: String,
}

/// Build the in-memory service graph
///
/// Returns the shared state and the event dispatcher, which the caller must
/// spawn (`tokio::spawn(dispatcher.run())`) for notifications to flow.
pub fn build(config: &Config, version: impl Into<String>) -> (Arc<AppState>, EventDispatcher) {
    let metrics = Arc::new(Metrics::new());
    let rng = SharedRng::from_seed_option(config.rng_seed());

    let (bus, mut dispatcher) =
        create_event_bus(config.event_buffer_size(), config.event_workers(), metrics.clone());

    let notifications = Arc::new(NotificationComposer::new(
        Arc::new(InMemoryNotificationStore::new()),
        metrics.clone(),
    ));
    dispatcher.subscribe(notifications.clone());

    let directory = InMemoryEmployeeDirectory::from_config(config.employees());
    let lifecycle = Arc::new(PackageLifecycle::new(
        Arc::new(InMemoryPackageStore::new()),
        Arc::new(directory.clone()),
        TrackingCodeGenerator::new(rng.clone()),
        bus,
        metrics.clone(),
    ));

    let simulator = ProgressSimulator::new(
        lifecycle.clone(),
        rng,
        SimulationSettings::from_config(config),
        metrics.clone(),
    );
    let streams = UpdateStream::new(
        lifecycle.clone(),
        simulator.clone(),
        StreamSettings::from_config(config),
        metrics.clone(),
    );

    let state = AppState {
        lifecycle,
        notifications,
        simulator,
        streams,
        directory,
        metrics,
        site_id: config.site_id().to_string(),
        version: version.into(),
    };
    (Arc::new(state), dispatcher)
}
