//! IO modules - external interfaces
//!
//! - `http` - JSON API, SSE stream route, health and metrics endpoints
//! - `sse` - Server-sent events response body
//! - `prometheus` - Prometheus text exposition

pub mod http;
pub mod prometheus;
pub mod sse;

// Re-export commonly used types
pub use http::{route, serve, start_http_server, HttpBody};
pub use prometheus::format_prometheus_metrics;
pub use sse::SseBody;
