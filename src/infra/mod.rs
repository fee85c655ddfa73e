//! Infrastructure - configuration, metrics, and storage adapters
//!
//! This module contains infrastructure concerns:
//! - `config` - Application configuration (TOML loading, defaults)
//! - `metrics` - Lock-free metrics collection
//! - `memory` - In-memory package/notification stores and employee directory

pub mod config;
pub mod memory;
pub mod metrics;

// Re-export commonly used types
pub use config::Config;
pub use memory::{InMemoryEmployeeDirectory, InMemoryNotificationStore, InMemoryPackageStore};
pub use metrics::Metrics;
