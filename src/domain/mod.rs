//! Domain models - packages, statuses and the rules that govern them
//!
//! This module contains the canonical data types used throughout the system:
//! - `types` - identifiers and the `PackageStatus` enumeration
//! - `transitions` - the status transition graph
//! - `package` - `Package`, its history and request payloads
//! - `tracking_code` - collision-checked code generation
//! - `notification` - outbound notification records
//! - `events` - lifecycle events carried by the event bus
//! - `ports` - store and directory interfaces

pub mod events;
pub mod notification;
pub mod package;
pub mod ports;
pub mod tracking_code;
pub mod transitions;
pub mod types;

// Re-export commonly used types at module level
pub use events::LifecycleEvent;
pub use notification::{DeliveryState, Notification, NotificationKind};
pub use package::{NewPackage, Package, StatusHistoryEntry, StatusSnapshot, StatusUpdate};
pub use ports::{EmployeeDirectory, NotificationStore, PackageStore, StoreError};
pub use tracking_code::{SharedRng, TrackingCodeGenerator};
pub use types::{PackageId, PackageStatus, TrackingCode};
