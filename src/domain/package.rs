//! Package data model: the tracked shipment, its audit history and the
//! request shapes that mutate it

use crate::domain::transitions::{self, InvalidTransition};
use crate::domain::types::{PackageId, PackageStatus, TrackingCode};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Days added to the creation time for the estimated delivery
pub const ESTIMATED_DELIVERY_DAYS: i64 = 3;

pub const MAX_NOTES_LEN: usize = 500;
pub const MAX_LOCATION_LEN: usize = 200;

/// Request payload rejected before any store access
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: &'static str },
    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("recipient phone must have 10 to 15 digits with an optional leading +")]
    InvalidPhone,
}

/// Who receives the package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub name: String,
    pub address: String,
    pub phone: String,
}

/// Who shipped the package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sender {
    pub name: String,
    pub address: String,
}

/// One immutable audit record, appended on every accepted status change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusHistoryEntry {
    pub status: PackageStatus,
    pub timestamp: DateTime<Utc>,
    pub updated_by: String,
    pub notes: Option<String>,
}

/// A tracked shipment
///
/// `history` is append-only and strictly time-ordered. Its last entry always
/// matches `status`, and nothing is appended once `status` is terminal. The
/// only mutation path is [`Package::record_transition`], which enforces both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub id: PackageId,
    #[serde(rename = "trackingNumber")]
    pub tracking_code: TrackingCode,
    pub recipient: Recipient,
    pub sender: Sender,
    pub status: PackageStatus,
    pub current_location: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub estimated_delivery: DateTime<Utc>,
    pub history: Vec<StatusHistoryEntry>,
}

impl Package {
    /// New REGISTERED package at the origin warehouse with an empty history.
    /// The id stays unassigned until the store saves it.
    pub fn register(
        tracking_code: TrackingCode,
        recipient: Recipient,
        sender: Sender,
        now: DateTime<Utc>,
    ) -> Self {
        let status = PackageStatus::Registered;
        Self {
            id: PackageId::unassigned(),
            tracking_code,
            recipient,
            sender,
            status,
            current_location: status.default_location().to_string(),
            created_at: now,
            updated_at: now,
            estimated_delivery: now + Duration::days(ESTIMATED_DELIVERY_DAYS),
            history: Vec::new(),
        }
    }

    /// Apply a validated move and append the matching history entry
    ///
    /// Returns the previous status. On error nothing is modified.
    pub fn record_transition(
        &mut self,
        to: PackageStatus,
        updated_by: &str,
        notes: Option<String>,
        location: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<PackageStatus, InvalidTransition> {
        let from = self.status;
        transitions::validate(from, to)?;

        // Keep the history strictly increasing even if the clock steps back
        let timestamp = match self.history.last() {
            Some(last) if now <= last.timestamp => last.timestamp + Duration::milliseconds(1),
            _ => now,
        };

        self.history.push(StatusHistoryEntry {
            status: to,
            timestamp,
            updated_by: updated_by.to_string(),
            notes,
        });
        self.status = to;
        // A blank explicit location means "use the status default"
        self.current_location = location
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| to.default_location().to_string());
        self.updated_at = timestamp;
        Ok(from)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            tracking_number: self.tracking_code.clone(),
            status: self.status,
            current_location: self.current_location.clone(),
            updated_at: self.updated_at,
        }
    }
}

/// Compact view pushed to stream subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub tracking_number: TrackingCode,
    pub status: PackageStatus,
    pub current_location: String,
    pub updated_at: DateTime<Utc>,
}

/// Creation request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPackage {
    pub recipient_name: String,
    #[serde(default)]
    pub recipient_address: String,
    pub recipient_phone: String,
    #[serde(default)]
    pub sender_name: String,
    #[serde(default)]
    pub sender_address: String,
}

impl NewPackage {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.recipient_name.trim().is_empty() {
            return Err(ValidationError::Required { field: "recipientName" });
        }
        if !is_valid_phone(&self.recipient_phone) {
            return Err(ValidationError::InvalidPhone);
        }
        Ok(())
    }

    pub fn into_parties(self) -> (Recipient, Sender) {
        (
            Recipient {
                name: self.recipient_name,
                address: self.recipient_address,
                phone: self.recipient_phone,
            },
            Sender { name: self.sender_name, address: self.sender_address },
        )
    }
}

/// Status update request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub status: PackageStatus,
    pub updated_by: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

impl StatusUpdate {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.updated_by.trim().is_empty() {
            return Err(ValidationError::Required { field: "updatedBy" });
        }
        if self.notes.as_deref().is_some_and(|n| n.chars().count() > MAX_NOTES_LEN) {
            return Err(ValidationError::TooLong { field: "notes", max: MAX_NOTES_LEN });
        }
        if self.location.as_deref().is_some_and(|l| l.chars().count() > MAX_LOCATION_LEN) {
            return Err(ValidationError::TooLong { field: "location", max: MAX_LOCATION_LEN });
        }
        Ok(())
    }
}

/// 10 to 15 ASCII digits, optionally preceded by `+`
pub fn is_valid_phone(phone: &str) -> bool {
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    (10..=15).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit())
}
