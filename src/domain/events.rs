//! Lifecycle events published after a package write succeeds

use crate::domain::package::Package;
use crate::domain::types::{PackageId, PackageStatus, TrackingCode};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    /// A package was registered; carries the persisted snapshot
    Created { package: Box<Package> },
    /// A status change was persisted
    StatusChanged {
        package_id: PackageId,
        tracking_code: TrackingCode,
        recipient_phone: String,
        old_status: PackageStatus,
        new_status: PackageStatus,
        updated_by: String,
        at: DateTime<Utc>,
    },
}

impl LifecycleEvent {
    pub fn created(package: Package) -> Self {
        LifecycleEvent::Created { package: Box::new(package) }
    }

    /// Built from the package after the change was applied
    pub fn status_changed(package: &Package, old_status: PackageStatus, updated_by: &str) -> Self {
        LifecycleEvent::StatusChanged {
            package_id: package.id.clone(),
            tracking_code: package.tracking_code.clone(),
            recipient_phone: package.recipient.phone.clone(),
            old_status,
            new_status: package.status,
            updated_by: updated_by.to_string(),
            at: package.updated_at,
        }
    }

    /// Short name used in log lines
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::Created { .. } => "package_created",
            LifecycleEvent::StatusChanged { .. } => "status_changed",
        }
    }

    pub fn tracking_code(&self) -> &TrackingCode {
        match self {
            LifecycleEvent::Created { package } => &package.tracking_code,
            LifecycleEvent::StatusChanged { tracking_code, .. } => tracking_code,
        }
    }
}
