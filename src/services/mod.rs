//! Services - business logic and background tasks
//!
//! This module contains the core business logic services:
//! - `lifecycle` - Package creation, validated status changes and queries
//! - `event_bus` - Non-blocking publish and bounded handler dispatch
//! - `notifications` - Event handler producing notification records
//! - `simulator` - Background progression of packages toward delivery
//! - `update_stream` - Polling status stream for one tracking code

pub mod event_bus;
pub mod lifecycle;
pub mod notifications;
pub mod simulator;
pub mod update_stream;

// Re-export commonly used types
pub use event_bus::{create_event_bus, EventBus, EventDispatcher, EventHandler};
pub use lifecycle::{LifecycleError, PackageLifecycle};
pub use notifications::NotificationComposer;
pub use simulator::{ProgressSimulator, SimulationSettings, StartOutcome};
pub use update_stream::{StreamEnd, StreamMessage, StreamSettings, UpdateStream};
