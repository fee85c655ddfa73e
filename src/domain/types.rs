//! Shared types for the parcel tracker

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Actor recorded on history entries written by the progress simulator
pub const AUTOMATED_ACTOR: &str = "automated system";

/// Note recorded on history entries written by the progress simulator
pub const AUTOMATED_NOTE: &str = "automatic status update";

/// Newtype wrapper for store-assigned package IDs
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageId(pub String);

impl PackageId {
    /// Placeholder carried until the store assigns a real id
    pub fn unassigned() -> Self {
        Self(String::new())
    }

    pub fn is_assigned(&self) -> bool {
        !self.0.is_empty()
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Human-facing tracking code, `TRK-` followed by 8 uppercase alphanumerics
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackingCode(String);

impl TrackingCode {
    pub const PREFIX: &'static str = "TRK-";
    pub const SUFFIX_LEN: usize = 8;

    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check the `TRK-XXXXXXXX` shape without consulting any store
    pub fn is_well_formed(&self) -> bool {
        match self.0.strip_prefix(Self::PREFIX) {
            Some(suffix) => {
                suffix.len() == Self::SUFFIX_LEN
                    && suffix.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
            }
            None => false,
        }
    }
}

impl fmt::Display for TrackingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackingCode {
    fn from(code: &str) -> Self {
        Self(code.to_string())
    }
}

/// Logistics status of a package
///
/// The allowed moves between statuses live in [`crate::domain::transitions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PackageStatus {
    Registered,
    Warehouse,
    InTransit,
    OutForDistribution,
    OutForDelivery,
    Delivered,
    Returned,
    Lost,
}

impl PackageStatus {
    pub const ALL: [PackageStatus; 8] = [
        PackageStatus::Registered,
        PackageStatus::Warehouse,
        PackageStatus::InTransit,
        PackageStatus::OutForDistribution,
        PackageStatus::OutForDelivery,
        PackageStatus::Delivered,
        PackageStatus::Returned,
        PackageStatus::Lost,
    ];

    /// Canonical wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageStatus::Registered => "REGISTERED",
            PackageStatus::Warehouse => "WAREHOUSE",
            PackageStatus::InTransit => "IN_TRANSIT",
            PackageStatus::OutForDistribution => "OUT_FOR_DISTRIBUTION",
            PackageStatus::OutForDelivery => "OUT_FOR_DELIVERY",
            PackageStatus::Delivered => "DELIVERED",
            PackageStatus::Returned => "RETURNED",
            PackageStatus::Lost => "LOST",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PackageStatus::Registered => "The package has been registered in the system",
            PackageStatus::Warehouse => "The package is at the origin warehouse",
            PackageStatus::InTransit => "The package is on its way to the destination",
            PackageStatus::OutForDistribution => "The package is being distributed locally",
            PackageStatus::OutForDelivery => "The package is being delivered",
            PackageStatus::Delivered => "The package has been delivered successfully",
            PackageStatus::Returned => "The package has been returned to the sender",
            PackageStatus::Lost => "The package has been reported as lost",
        }
    }

    /// DELIVERED, RETURNED and LOST have no outgoing transitions
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, PackageStatus::Delivered | PackageStatus::Returned | PackageStatus::Lost)
    }

    /// Simulated location used when an update does not carry one
    pub fn default_location(&self) -> &'static str {
        match self {
            PackageStatus::Registered | PackageStatus::Warehouse => "origin warehouse",
            PackageStatus::InTransit => "main distribution hub",
            PackageStatus::OutForDistribution => "local distribution hub",
            PackageStatus::OutForDelivery => "delivery route",
            PackageStatus::Delivered => "delivered to recipient",
            PackageStatus::Returned => "return in progress",
            PackageStatus::Lost => "location unknown",
        }
    }
}

impl fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a status name is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown package status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for PackageStatus {
    type Err = UnknownStatus;

    /// Case-insensitive; the Spanish names used by older clients map one-to-one
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace(|c: char| c == '-' || c == ' ', "_");
        let status = match normalized.as_str() {
            "REGISTERED" | "REGISTRADO" => PackageStatus::Registered,
            "WAREHOUSE" | "EN_ALMACEN" => PackageStatus::Warehouse,
            "IN_TRANSIT" | "EN_TRANSITO" => PackageStatus::InTransit,
            "OUT_FOR_DISTRIBUTION" | "EN_DISTRIBUCION" => PackageStatus::OutForDistribution,
            "OUT_FOR_DELIVERY" | "EN_REPARTO" => PackageStatus::OutForDelivery,
            "DELIVERED" | "ENTREGADO" => PackageStatus::Delivered,
            "RETURNED" | "DEVUELTO" => PackageStatus::Returned,
            "LOST" | "PERDIDO" => PackageStatus::Lost,
            _ => return Err(UnknownStatus(s.to_string())),
        };
        Ok(status)
    }
}

impl Serialize for PackageStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PackageStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
