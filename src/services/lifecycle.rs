//! Package lifecycle: creation, validated status changes and queries
//!
//! Every write for a given tracking code runs inside a per-code async critical
//! section, so a manual update and a simulator step for the same package are
//! applied one after the other and the second is validated against the
//! first's result. Events are published only after the store write succeeds;
//! a dropped event never fails or rolls back the write.

use crate::domain::events::LifecycleEvent;
use crate::domain::package::{NewPackage, Package, StatusUpdate, ValidationError};
use crate::domain::ports::{EmployeeDirectory, PackageStore, StoreError};
use crate::domain::tracking_code::{GenerationExhausted, TrackingCodeGenerator};
use crate::domain::transitions::InvalidTransition;
use crate::domain::types::{PackageId, PackageStatus, TrackingCode, AUTOMATED_ACTOR};
use crate::infra::metrics::Metrics;
use crate::services::event_bus::EventBus;
use chrono::Utc;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Statuses reported by the in-transit listing
pub const IN_TRANSIT_STATUSES: [PackageStatus; 4] = [
    PackageStatus::Warehouse,
    PackageStatus::InTransit,
    PackageStatus::OutForDistribution,
    PackageStatus::OutForDelivery,
];

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("package not found: {0}")]
    PackageNotFound(String),
    #[error("employee not found or inactive: {0}")]
    ActorNotFound(String),
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    GenerationExhausted(#[from] GenerationExhausted),
    #[error(transparent)]
    Store(#[from] StoreError),
}

type CodeLock = Arc<tokio::sync::Mutex<()>>;

pub struct PackageLifecycle {
    packages: Arc<dyn PackageStore>,
    directory: Arc<dyn EmployeeDirectory>,
    codes: TrackingCodeGenerator,
    bus: EventBus,
    metrics: Arc<Metrics>,
    /// One async mutex per tracking code with a write in flight
    locks: parking_lot::Mutex<FxHashMap<TrackingCode, CodeLock>>,
}

impl PackageLifecycle {
    pub fn new(
        packages: Arc<dyn PackageStore>,
        directory: Arc<dyn EmployeeDirectory>,
        codes: TrackingCodeGenerator,
        bus: EventBus,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            packages,
            directory,
            codes,
            bus,
            metrics,
            locks: parking_lot::Mutex::new(FxHashMap::default()),
        }
    }

    /// Register a new package with a fresh tracking code
    pub async fn create(&self, request: NewPackage) -> Result<Package, LifecycleError> {
        request.validate()?;

        let code = self
            .codes
            .generate_unique(|candidate| {
                let packages = self.packages.clone();
                async move { packages.exists(&candidate).await.map_err(LifecycleError::from) }
            })
            .await?;

        let (recipient, sender) = request.into_parties();
        let package = Package::register(code, recipient, sender, Utc::now());
        let saved = self.packages.save(package).await?;

        self.metrics.record_package_created();
        info!(
            tracking_code = %saved.tracking_code,
            package_id = %saved.id,
            recipient_phone = %saved.recipient.phone,
            "package_created"
        );

        self.bus.publish(LifecycleEvent::created(saved.clone()));
        Ok(saved)
    }

    /// Validate and apply a status change, append history, persist, publish
    pub async fn apply_status_change(
        &self,
        code: &TrackingCode,
        update: StatusUpdate,
    ) -> Result<Package, LifecycleError> {
        update.validate()?;
        let actor = update.updated_by.trim().to_string();
        if actor != AUTOMATED_ACTOR && !self.directory.is_active(&actor).await? {
            warn!(tracking_code = %code, actor = %actor, "status_change_unknown_actor");
            return Err(LifecycleError::ActorNotFound(actor));
        }

        let lock = self.lock_for(code);
        let guard = lock.lock().await;
        let started = Instant::now();
        let result = self.write_status_change(code, update, &actor).await;
        let latency_us = started.elapsed().as_micros() as u64;
        drop(guard);
        self.release(code, lock);

        let (package, old_status) = result?;
        self.metrics.record_transition_applied(latency_us);
        info!(
            tracking_code = %code,
            from = %old_status,
            to = %package.status,
            actor = %actor,
            location = %package.current_location,
            "status_changed"
        );

        self.bus.publish(LifecycleEvent::status_changed(&package, old_status, &actor));
        Ok(package)
    }

    /// Load, transition and save; runs with the code lock held
    async fn write_status_change(
        &self,
        code: &TrackingCode,
        update: StatusUpdate,
        actor: &str,
    ) -> Result<(Package, PackageStatus), LifecycleError> {
        let mut package = self
            .packages
            .find_by_tracking_code(code)
            .await?
            .ok_or_else(|| LifecycleError::PackageNotFound(code.to_string()))?;

        let old_status = package
            .record_transition(update.status, actor, update.notes, update.location, Utc::now())
            .map_err(|e| {
                self.metrics.record_transition_rejected();
                warn!(tracking_code = %code, from = %e.from, to = %e.to, "status_change_rejected");
                e
            })?;

        let saved = self.packages.save(package).await?;
        Ok((saved, old_status))
    }

    fn lock_for(&self, code: &TrackingCode) -> CodeLock {
        self.locks.lock().entry(code.clone()).or_default().clone()
    }

    /// Drop the map entry once nobody else holds or waits on it
    fn release(&self, code: &TrackingCode, lock: CodeLock) {
        let mut locks = self.locks.lock();
        // Clones are only handed out under the map mutex, so a count of one
        // here means no other writer can still reach this entry
        drop(lock);
        if locks.get(code).is_some_and(|entry| Arc::strong_count(entry) == 1) {
            locks.remove(code);
        }
    }

    pub async fn find_by_tracking_code(&self, code: &TrackingCode) -> Result<Package, LifecycleError> {
        self.packages
            .find_by_tracking_code(code)
            .await?
            .ok_or_else(|| LifecycleError::PackageNotFound(code.to_string()))
    }

    pub async fn find_by_id(&self, id: &PackageId) -> Result<Package, LifecycleError> {
        self.packages
            .find_by_id(id)
            .await?
            .ok_or_else(|| LifecycleError::PackageNotFound(id.to_string()))
    }

    pub async fn list_all(&self) -> Result<Vec<Package>, LifecycleError> {
        Ok(self.packages.list_all().await?)
    }

    pub async fn list_by_status(&self, status: PackageStatus) -> Result<Vec<Package>, LifecycleError> {
        Ok(self.packages.list_by_status(status).await?)
    }

    pub async fn list_by_recipient_phone(&self, phone: &str) -> Result<Vec<Package>, LifecycleError> {
        Ok(self.packages.list_by_recipient_phone(phone).await?)
    }

    /// Packages between the warehouse and the doorstep
    pub async fn packages_in_transit(&self) -> Result<Vec<Package>, LifecycleError> {
        let mut packages = Vec::new();
        for status in IN_TRANSIT_STATUSES {
            packages.extend(self.packages.list_by_status(status).await?);
        }
        Ok(packages)
    }

    /// Number of tracking codes with a write in flight
    pub fn locked_codes(&self) -> usize {
        self.locks.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tracking_code::SharedRng;
    use crate::infra::memory::{InMemoryEmployeeDirectory, InMemoryPackageStore};
    use crate::services::event_bus::{create_event_bus, EventDispatcher};

    fn lifecycle() -> (Arc<PackageLifecycle>, EventDispatcher, Arc<Metrics>) {
        let metrics = Arc::new(Metrics::new());
        let (bus, dispatcher) = create_event_bus(64, 2, metrics.clone());
        let directory = InMemoryEmployeeDirectory::default();
        directory.upsert("EMP001", true);
        directory.upsert("EMP002", false);
        let lifecycle = PackageLifecycle::new(
            Arc::new(InMemoryPackageStore::new()),
            Arc::new(directory),
            TrackingCodeGenerator::new(SharedRng::seeded(11)),
            bus,
            metrics.clone(),
        );
        (Arc::new(lifecycle), dispatcher, metrics)
    }

    fn request() -> NewPackage {
        NewPackage {
            recipient_name: "Ana Ruiz".to_string(),
            recipient_address: "Calle 1".to_string(),
            recipient_phone: "3001234567".to_string(),
            sender_name: "Shop".to_string(),
            sender_address: "Av 9".to_string(),
        }
    }

    fn update(status: PackageStatus, actor: &str) -> StatusUpdate {
        StatusUpdate { status, updated_by: actor.to_string(), notes: None, location: None }
    }

    #[tokio::test]
    async fn test_create_registers_package() {
        let (lifecycle, _dispatcher, metrics) = lifecycle();
        let package = lifecycle.create(request()).await.unwrap();

        assert!(package.tracking_code.is_well_formed());
        assert!(package.id.is_assigned());
        assert_eq!(package.status, PackageStatus::Registered);
        assert_eq!(metrics.packages_created(), 1);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_phone() {
        let (lifecycle, _dispatcher, _) = lifecycle();
        let mut bad = request();
        bad.recipient_phone = "12345".to_string();
        let err = lifecycle.create(bad).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Validation(ValidationError::InvalidPhone)));
        assert!(lifecycle.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_or_inactive_actor_rejected() {
        let (lifecycle, _dispatcher, _) = lifecycle();
        let package = lifecycle.create(request()).await.unwrap();

        for actor in ["EMP404", "EMP002"] {
            let err = lifecycle
                .apply_status_change(&package.tracking_code, update(PackageStatus::Warehouse, actor))
                .await
                .unwrap_err();
            assert!(matches!(err, LifecycleError::ActorNotFound(ref a) if a == actor));
        }
    }

    #[tokio::test]
    async fn test_automated_actor_skips_directory() {
        let (lifecycle, _dispatcher, _) = lifecycle();
        let package = lifecycle.create(request()).await.unwrap();
        let updated = lifecycle
            .apply_status_change(
                &package.tracking_code,
                update(PackageStatus::Warehouse, AUTOMATED_ACTOR),
            )
            .await
            .unwrap();
        assert_eq!(updated.history[0].updated_by, AUTOMATED_ACTOR);
    }

    #[tokio::test]
    async fn test_missing_package() {
        let (lifecycle, _dispatcher, _) = lifecycle();
        let err = lifecycle
            .apply_status_change(
                &TrackingCode::from("TRK-NOPE0000"),
                update(PackageStatus::Warehouse, "EMP001"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::PackageNotFound(_)));
        assert_eq!(lifecycle.locked_codes(), 0);
    }

    #[tokio::test]
    async fn test_rejection_counted_and_lock_released() {
        let (lifecycle, _dispatcher, metrics) = lifecycle();
        let package = lifecycle.create(request()).await.unwrap();
        let err = lifecycle
            .apply_status_change(&package.tracking_code, update(PackageStatus::Lost, "EMP001"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LifecycleError::InvalidTransition(InvalidTransition {
                from: PackageStatus::Registered,
                to: PackageStatus::Lost
            })
        ));
        assert_eq!(metrics.transitions_rejected(), 1);
        assert_eq!(lifecycle.locked_codes(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_serialized() {
        let (lifecycle, _dispatcher, _) = lifecycle();
        let package = lifecycle.create(request()).await.unwrap();
        let code = package.tracking_code.clone();

        // Both race from REGISTERED to WAREHOUSE; only one can win
        let a = {
            let lifecycle = lifecycle.clone();
            let code = code.clone();
            tokio::spawn(async move {
                lifecycle.apply_status_change(&code, update(PackageStatus::Warehouse, "EMP001")).await
            })
        };
        let b = {
            let lifecycle = lifecycle.clone();
            let code = code.clone();
            tokio::spawn(async move {
                lifecycle.apply_status_change(&code, update(PackageStatus::Warehouse, "EMP001")).await
            })
        };
        let results = [a.await.unwrap(), b.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let stored = lifecycle.find_by_tracking_code(&code).await.unwrap();
        assert_eq!(stored.history.len(), 1);
        assert_eq!(lifecycle.locked_codes(), 0);
    }

    #[tokio::test]
    async fn test_in_transit_listing() {
        let (lifecycle, _dispatcher, _) = lifecycle();
        let first = lifecycle.create(request()).await.unwrap();
        lifecycle.create(request()).await.unwrap();
        lifecycle
            .apply_status_change(&first.tracking_code, update(PackageStatus::InTransit, "EMP001"))
            .await
            .unwrap();

        let in_transit = lifecycle.packages_in_transit().await.unwrap();
        assert_eq!(in_transit.len(), 1);
        assert_eq!(in_transit[0].tracking_code, first.tracking_code);
        assert_eq!(lifecycle.list_by_recipient_phone("3001234567").await.unwrap().len(), 2);
    }
}
