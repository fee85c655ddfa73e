//! Outbound notification records produced from lifecycle events

use crate::domain::types::{PackageId, PackageStatus, TrackingCode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    StatusUpdate,
    DeliveryConfirmed,
    Exception,
}

impl NotificationKind {
    /// DELIVERED confirms, LOST and RETURNED are exceptions, the rest are plain updates
    pub fn classify(status: PackageStatus) -> Self {
        match status {
            PackageStatus::Delivered => NotificationKind::DeliveryConfirmed,
            PackageStatus::Lost | PackageStatus::Returned => NotificationKind::Exception,
            _ => NotificationKind::StatusUpdate,
        }
    }
}

/// Delivery progress of a notification; only moves forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryState {
    Pending,
    Sent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub package_id: PackageId,
    #[serde(rename = "trackingNumber")]
    pub tracking_code: TrackingCode,
    pub recipient_phone: String,
    pub message: String,
    pub kind: NotificationKind,
    pub state: DeliveryState,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl Notification {
    /// Pending notification for a package that just reached `status`
    pub fn for_status(
        package_id: PackageId,
        tracking_code: TrackingCode,
        recipient_phone: String,
        status: PackageStatus,
        now: DateTime<Utc>,
    ) -> Self {
        let message = compose_message(&tracking_code, status);
        Self {
            id: String::new(),
            package_id,
            tracking_code,
            recipient_phone,
            message,
            kind: NotificationKind::classify(status),
            state: DeliveryState::Pending,
            created_at: now,
            sent_at: None,
        }
    }

    /// Pending -> Sent. Returns false and leaves the record alone if it
    /// already moved past pending.
    pub fn mark_sent(&mut self, now: DateTime<Utc>) -> bool {
        if self.state != DeliveryState::Pending {
            return false;
        }
        self.state = DeliveryState::Sent;
        self.sent_at = Some(now);
        true
    }
}

/// Fixed per-status message text
pub fn compose_message(code: &TrackingCode, status: PackageStatus) -> String {
    let tail = match status {
        PackageStatus::Registered => "has been registered in our system.",
        PackageStatus::Warehouse => "is at our origin warehouse.",
        PackageStatus::InTransit => "is in transit to its destination.",
        PackageStatus::OutForDistribution => "is at the local distribution center.",
        PackageStatus::OutForDelivery => "is out for delivery. Please be available.",
        PackageStatus::Delivered => "has been delivered successfully. Thank you for choosing us!",
        PackageStatus::Returned => "has been returned. Please contact customer service.",
        PackageStatus::Lost => {
            "has been reported lost. We are investigating; please contact customer service."
        }
    };
    format!("Your package with tracking number {code} {tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(
            NotificationKind::classify(PackageStatus::Delivered),
            NotificationKind::DeliveryConfirmed
        );
        assert_eq!(NotificationKind::classify(PackageStatus::Lost), NotificationKind::Exception);
        assert_eq!(NotificationKind::classify(PackageStatus::Returned), NotificationKind::Exception);
        for status in [
            PackageStatus::Registered,
            PackageStatus::Warehouse,
            PackageStatus::InTransit,
            PackageStatus::OutForDistribution,
            PackageStatus::OutForDelivery,
        ] {
            assert_eq!(NotificationKind::classify(status), NotificationKind::StatusUpdate);
        }
    }

    #[test]
    fn test_message_mentions_code() {
        let code = TrackingCode::from("TRK-ZZ00ZZ00");
        for status in PackageStatus::ALL {
            assert!(compose_message(&code, status).contains("TRK-ZZ00ZZ00"));
        }
        assert!(compose_message(&code, PackageStatus::OutForDelivery).ends_with("Please be available."));
    }

    #[test]
    fn test_mark_sent_is_one_directional() {
        let now = Utc::now();
        let mut notification = Notification::for_status(
            PackageId("p-1".to_string()),
            TrackingCode::from("TRK-ZZ00ZZ00"),
            "3001234567".to_string(),
            PackageStatus::Warehouse,
            now,
        );
        assert_eq!(notification.state, DeliveryState::Pending);
        assert!(notification.mark_sent(now));
        assert_eq!(notification.state, DeliveryState::Sent);
        assert_eq!(notification.sent_at, Some(now));
        assert!(!notification.mark_sent(now));
    }

    #[test]
    fn test_kind_wire_names() {
        let json = serde_json::to_string(&NotificationKind::DeliveryConfirmed).unwrap();
        assert_eq!(json, "\"DELIVERY_CONFIRMED\"");
        let json = serde_json::to_string(&DeliveryState::Pending).unwrap();
        assert_eq!(json, "\"PENDING\"");
    }
}
