//! In-memory store and directory adapters
//!
//! Each store keeps its state behind a `parking_lot::RwLock`; no lock is held
//! across an await point, so the async trait methods never block the runtime
//! for longer than a map operation.

use crate::domain::notification::{DeliveryState, Notification};
use crate::domain::package::Package;
use crate::domain::ports::{EmployeeDirectory, NotificationStore, PackageStore, StoreError};
use crate::domain::types::{PackageId, PackageStatus, TrackingCode};
use crate::infra::config::EmployeeConfig;
use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Generate a new UUIDv7 (time-sortable)
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

#[derive(Default)]
struct PackageTable {
    by_id: FxHashMap<PackageId, Package>,
    by_code: FxHashMap<TrackingCode, PackageId>,
    /// Insertion order, so listings are stable
    order: Vec<PackageId>,
}

impl PackageTable {
    fn ordered(&self) -> impl Iterator<Item = &Package> {
        self.order.iter().filter_map(|id| self.by_id.get(id))
    }
}

#[derive(Default, Clone)]
pub struct InMemoryPackageStore {
    table: Arc<RwLock<PackageTable>>,
}

impl InMemoryPackageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.table.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PackageStore for InMemoryPackageStore {
    async fn save(&self, mut package: Package) -> Result<Package, StoreError> {
        if !package.id.is_assigned() {
            package.id = PackageId(new_uuid_v7());
        }

        let mut table = self.table.write();
        match table.by_code.get(&package.tracking_code).cloned() {
            Some(owner) if owner != package.id => {
                return Err(StoreError::DuplicateTrackingCode(package.tracking_code));
            }
            Some(_) => {}
            None => {
                table.by_code.insert(package.tracking_code.clone(), package.id.clone());
            }
        }
        if !table.by_id.contains_key(&package.id) {
            table.order.push(package.id.clone());
        }
        table.by_id.insert(package.id.clone(), package.clone());
        Ok(package)
    }

    async fn find_by_id(&self, id: &PackageId) -> Result<Option<Package>, StoreError> {
        Ok(self.table.read().by_id.get(id).cloned())
    }

    async fn find_by_tracking_code(
        &self,
        code: &TrackingCode,
    ) -> Result<Option<Package>, StoreError> {
        let table = self.table.read();
        Ok(table.by_code.get(code).and_then(|id| table.by_id.get(id)).cloned())
    }

    async fn exists(&self, code: &TrackingCode) -> Result<bool, StoreError> {
        Ok(self.table.read().by_code.contains_key(code))
    }

    async fn list_all(&self) -> Result<Vec<Package>, StoreError> {
        Ok(self.table.read().ordered().cloned().collect())
    }

    async fn list_by_status(&self, status: PackageStatus) -> Result<Vec<Package>, StoreError> {
        Ok(self.table.read().ordered().filter(|p| p.status == status).cloned().collect())
    }

    async fn list_by_recipient_phone(&self, phone: &str) -> Result<Vec<Package>, StoreError> {
        Ok(self.table.read().ordered().filter(|p| p.recipient.phone == phone).cloned().collect())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryNotificationStore {
    rows: Arc<RwLock<Vec<Notification>>>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn save(&self, mut notification: Notification) -> Result<Notification, StoreError> {
        if notification.id.is_empty() {
            notification.id = new_uuid_v7();
        }

        let mut rows = self.rows.write();
        match rows.iter_mut().find(|n| n.id == notification.id) {
            Some(existing) => *existing = notification.clone(),
            None => rows.push(notification.clone()),
        }
        Ok(notification)
    }

    async fn list_by_package(&self, id: &PackageId) -> Result<Vec<Notification>, StoreError> {
        Ok(self.rows.read().iter().filter(|n| &n.package_id == id).cloned().collect())
    }

    async fn list_by_tracking_code(
        &self,
        code: &TrackingCode,
    ) -> Result<Vec<Notification>, StoreError> {
        Ok(self.rows.read().iter().filter(|n| &n.tracking_code == code).cloned().collect())
    }

    async fn list_pending(&self) -> Result<Vec<Notification>, StoreError> {
        let mut pending: Vec<_> = self
            .rows
            .read()
            .iter()
            .rev()
            .filter(|n| n.state == DeliveryState::Pending)
            .cloned()
            .collect();
        // Stable sort keeps later inserts first among equal timestamps
        pending.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(pending)
    }
}

/// Employee directory seeded from configuration
#[derive(Default, Clone)]
pub struct InMemoryEmployeeDirectory {
    active: Arc<RwLock<FxHashMap<String, bool>>>,
}

impl InMemoryEmployeeDirectory {
    pub fn from_config(employees: &[EmployeeConfig]) -> Self {
        let active = employees.iter().map(|e| (e.id.clone(), e.active)).collect();
        Self { active: Arc::new(RwLock::new(active)) }
    }

    /// Add or update one employee
    pub fn upsert(&self, employee_id: &str, active: bool) {
        self.active.write().insert(employee_id.to_string(), active);
    }
}

#[async_trait]
impl EmployeeDirectory for InMemoryEmployeeDirectory {
    async fn is_active(&self, employee_id: &str) -> Result<bool, StoreError> {
        Ok(self.active.read().get(employee_id).copied().unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::package::{Recipient, Sender};
    use chrono::{Duration, Utc};

    fn package(code: &str, phone: &str) -> Package {
        Package::register(
            TrackingCode::from(code),
            Recipient { name: "R".to_string(), address: "A".to_string(), phone: phone.to_string() },
            Sender { name: "S".to_string(), address: "B".to_string() },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_save_assigns_id_and_indexes_code() {
        let store = InMemoryPackageStore::new();
        let saved = store.save(package("TRK-AAAA0001", "3001234567")).await.unwrap();

        assert!(saved.id.is_assigned());
        assert!(store.exists(&saved.tracking_code).await.unwrap());
        let found = store.find_by_tracking_code(&saved.tracking_code).await.unwrap().unwrap();
        assert_eq!(found.id, saved.id);
        assert_eq!(store.find_by_id(&saved.id).await.unwrap(), Some(saved));
    }

    #[tokio::test]
    async fn test_save_replaces_existing_package() {
        let store = InMemoryPackageStore::new();
        let mut saved = store.save(package("TRK-AAAA0001", "3001234567")).await.unwrap();
        saved.current_location = "dock 4".to_string();
        store.save(saved.clone()).await.unwrap();

        assert_eq!(store.len(), 1);
        let found = store.find_by_id(&saved.id).await.unwrap().unwrap();
        assert_eq!(found.current_location, "dock 4");
    }

    #[tokio::test]
    async fn test_duplicate_tracking_code_rejected() {
        let store = InMemoryPackageStore::new();
        store.save(package("TRK-AAAA0001", "3001234567")).await.unwrap();
        let err = store.save(package("TRK-AAAA0001", "3007654321")).await.unwrap_err();
        assert_eq!(err, StoreError::DuplicateTrackingCode(TrackingCode::from("TRK-AAAA0001")));
    }

    #[tokio::test]
    async fn test_listing_filters() {
        let store = InMemoryPackageStore::new();
        store.save(package("TRK-AAAA0001", "3001234567")).await.unwrap();
        store.save(package("TRK-AAAA0002", "3001234567")).await.unwrap();
        let mut third = package("TRK-AAAA0003", "3009999999");
        third.status = PackageStatus::InTransit;
        store.save(third).await.unwrap();

        assert_eq!(store.list_all().await.unwrap().len(), 3);
        assert_eq!(store.list_by_recipient_phone("3001234567").await.unwrap().len(), 2);
        let in_transit = store.list_by_status(PackageStatus::InTransit).await.unwrap();
        assert_eq!(in_transit.len(), 1);
        assert_eq!(in_transit[0].tracking_code.as_str(), "TRK-AAAA0003");
    }

    #[tokio::test]
    async fn test_pending_notifications_newest_first() {
        let store = InMemoryNotificationStore::new();
        let now = Utc::now();
        let make = |offset: i64, status| {
            Notification::for_status(
                PackageId("p".to_string()),
                TrackingCode::from("TRK-AAAA0001"),
                "3001234567".to_string(),
                status,
                now + Duration::seconds(offset),
            )
        };
        store.save(make(0, PackageStatus::Registered)).await.unwrap();
        store.save(make(10, PackageStatus::Warehouse)).await.unwrap();
        let mut sent = store.save(make(20, PackageStatus::InTransit)).await.unwrap();
        sent.mark_sent(now);
        store.save(sent).await.unwrap();

        let pending = store.list_pending().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending[0].created_at > pending[1].created_at);
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_directory_reports_active_employees() {
        let directory = InMemoryEmployeeDirectory::from_config(&[
            EmployeeConfig {
                id: "EMP001".to_string(),
                name: String::new(),
                role: String::new(),
                active: true,
            },
            EmployeeConfig {
                id: "EMP002".to_string(),
                name: String::new(),
                role: String::new(),
                active: false,
            },
        ]);
        assert!(directory.is_active("EMP001").await.unwrap());
        assert!(!directory.is_active("EMP002").await.unwrap());
        assert!(!directory.is_active("EMP999").await.unwrap());

        directory.upsert("EMP002", true);
        assert!(directory.is_active("EMP002").await.unwrap());
    }
}
