//! Notification composer: turns lifecycle events into notification records
//!
//! There is no outbound transport. A notification is persisted as pending and
//! then immediately marked sent, which is where an SMS or push integration
//! would hook in.

use crate::domain::events::LifecycleEvent;
use crate::domain::notification::Notification;
use crate::domain::ports::{NotificationStore, StoreError};
use crate::domain::types::{PackageId, PackageStatus, TrackingCode};
use crate::infra::metrics::Metrics;
use crate::services::event_bus::EventHandler;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

pub struct NotificationComposer {
    store: Arc<dyn NotificationStore>,
    metrics: Arc<Metrics>,
}

impl NotificationComposer {
    pub fn new(store: Arc<dyn NotificationStore>, metrics: Arc<Metrics>) -> Self {
        Self { store, metrics }
    }

    /// Persist a notification for `status`, then mark it sent
    pub async fn notify(
        &self,
        package_id: PackageId,
        tracking_code: TrackingCode,
        recipient_phone: String,
        status: PackageStatus,
    ) -> Result<Notification, StoreError> {
        let pending =
            Notification::for_status(package_id, tracking_code, recipient_phone, status, Utc::now());
        let mut notification = self.store.save(pending).await?;

        if notification.mark_sent(Utc::now()) {
            notification = self.store.save(notification).await?;
        }

        self.metrics.record_notification_sent();
        info!(
            tracking_code = %notification.tracking_code,
            status = %status,
            kind = ?notification.kind,
            message = %notification.message,
            "notification_sent"
        );
        Ok(notification)
    }

    pub async fn for_package(&self, id: &PackageId) -> Result<Vec<Notification>, StoreError> {
        self.store.list_by_package(id).await
    }

    pub async fn for_tracking_code(
        &self,
        code: &TrackingCode,
    ) -> Result<Vec<Notification>, StoreError> {
        self.store.list_by_tracking_code(code).await
    }

    /// Pending notifications, newest first
    pub async fn pending(&self) -> Result<Vec<Notification>, StoreError> {
        self.store.list_pending().await
    }
}

#[async_trait]
impl EventHandler for NotificationComposer {
    fn name(&self) -> &'static str {
        "notification_composer"
    }

    async fn handle(&self, event: &LifecycleEvent) -> anyhow::Result<()> {
        match event {
            LifecycleEvent::Created { package } => {
                self.notify(
                    package.id.clone(),
                    package.tracking_code.clone(),
                    package.recipient.phone.clone(),
                    package.status,
                )
                .await?;
            }
            LifecycleEvent::StatusChanged {
                package_id,
                tracking_code,
                recipient_phone,
                new_status,
                ..
            } => {
                self.notify(
                    package_id.clone(),
                    tracking_code.clone(),
                    recipient_phone.clone(),
                    *new_status,
                )
                .await?;
            }
        }
        Ok(())
    }
}
