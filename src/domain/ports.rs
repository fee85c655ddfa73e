//! Collaborator interfaces the lifecycle engine depends on
//!
//! Implementations live in `infra`; the in-memory ones back the binary and the
//! tests.

use crate::domain::notification::Notification;
use crate::domain::package::Package;
use crate::domain::types::{PackageId, PackageStatus, TrackingCode};
use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("tracking code {0} is already taken by another package")]
    DuplicateTrackingCode(TrackingCode),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait PackageStore: Send + Sync {
    /// Insert or replace; assigns an id when the package has none yet
    async fn save(&self, package: Package) -> Result<Package, StoreError>;
    async fn find_by_id(&self, id: &PackageId) -> Result<Option<Package>, StoreError>;
    async fn find_by_tracking_code(&self, code: &TrackingCode)
        -> Result<Option<Package>, StoreError>;
    async fn exists(&self, code: &TrackingCode) -> Result<bool, StoreError>;
    async fn list_all(&self) -> Result<Vec<Package>, StoreError>;
    async fn list_by_status(&self, status: PackageStatus) -> Result<Vec<Package>, StoreError>;
    async fn list_by_recipient_phone(&self, phone: &str) -> Result<Vec<Package>, StoreError>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Insert or replace; assigns an id when the notification has none yet
    async fn save(&self, notification: Notification) -> Result<Notification, StoreError>;
    async fn list_by_package(&self, id: &PackageId) -> Result<Vec<Notification>, StoreError>;
    async fn list_by_tracking_code(
        &self,
        code: &TrackingCode,
    ) -> Result<Vec<Notification>, StoreError>;
    /// Pending notifications, newest first
    async fn list_pending(&self) -> Result<Vec<Notification>, StoreError>;
}

#[async_trait]
pub trait EmployeeDirectory: Send + Sync {
    /// True when the id belongs to a known, active employee
    async fn is_active(&self, employee_id: &str) -> Result<bool, StoreError>;
}
