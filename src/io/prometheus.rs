//! Prometheus text exposition for the `/metrics` endpoint

use crate::infra::metrics::{MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use std::fmt::Write;

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with site label
fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    site: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

/// Write a histogram metric with buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    site: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    avg: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in METRICS_BUCKET_BOUNDS.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"+Inf\"}} {cumulative}");

    let count: u64 = buckets.iter().sum();
    let sum = avg * count;
    let _ = writeln!(output, "{name}_sum{{site=\"{site}\"}} {sum}");
    let _ = writeln!(output, "{name}_count{{site=\"{site}\"}} {count}");
}

/// Format a summary in Prometheus text exposition format
pub fn format_prometheus_metrics(summary: &MetricsSummary, site: &str) -> String {
    let mut output = String::with_capacity(4096);

    write_lifecycle_metrics(&mut output, site, summary);
    write_event_metrics(&mut output, site, summary);
    write_background_metrics(&mut output, site, summary);

    output
}

fn write_lifecycle_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "parcel_packages_created_total",
        "Packages registered",
        MetricType::Counter,
        site,
        summary.packages_created,
    );
    write_metric(
        output,
        "parcel_transitions_applied_total",
        "Status transitions persisted",
        MetricType::Counter,
        site,
        summary.transitions_applied,
    );
    write_metric(
        output,
        "parcel_transitions_rejected_total",
        "Status transitions refused by the transition graph",
        MetricType::Counter,
        site,
        summary.transitions_rejected,
    );
    write_histogram(
        output,
        "parcel_transition_latency_us",
        "Locked load-transition-save latency in microseconds",
        site,
        &summary.transition_lat_buckets,
        summary.transition_lat_avg_us,
    );
}

fn write_event_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "parcel_events_published_total",
        "Lifecycle events accepted by the bus",
        MetricType::Counter,
        site,
        summary.events_published,
    );
    write_metric(
        output,
        "parcel_events_dropped_total",
        "Lifecycle events dropped (bus full or closed)",
        MetricType::Counter,
        site,
        summary.events_dropped,
    );
    write_metric(
        output,
        "parcel_handler_failures_total",
        "Event handler errors and panics",
        MetricType::Counter,
        site,
        summary.handler_failures,
    );
    write_metric(
        output,
        "parcel_notifications_sent_total",
        "Notifications marked sent",
        MetricType::Counter,
        site,
        summary.notifications_sent,
    );
}

fn write_background_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "parcel_simulations_started_total",
        "Simulator tasks started",
        MetricType::Counter,
        site,
        summary.simulations_started,
    );
    write_metric(
        output,
        "parcel_simulations_finished_total",
        "Simulator tasks finished or cancelled",
        MetricType::Counter,
        site,
        summary.simulations_finished,
    );
    write_metric(
        output,
        "parcel_simulations_running",
        "Simulator tasks currently alive",
        MetricType::Gauge,
        site,
        summary.running_simulations as u64,
    );
    write_metric(
        output,
        "parcel_streams_opened_total",
        "Update streams opened",
        MetricType::Counter,
        site,
        summary.streams_opened,
    );
    write_metric(
        output,
        "parcel_streams_active",
        "Update streams currently connected",
        MetricType::Gauge,
        site,
        summary.active_streams,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::metrics::Metrics;

    #[test]
    fn test_format_prometheus_metrics() {
        let metrics = Metrics::new();
        metrics.record_package_created();
        metrics.record_transition_applied(150);
        metrics.record_transition_applied(250);
        metrics.stream_opened();

        let output = format_prometheus_metrics(&metrics.snapshot(3), "hub-1");

        assert!(output.contains("parcel_packages_created_total{site=\"hub-1\"} 1"));
        assert!(output.contains("parcel_transitions_applied_total{site=\"hub-1\"} 2"));
        assert!(output.contains("parcel_transition_latency_us_bucket{site=\"hub-1\",le=\"+Inf\"} 2"));
        assert!(output.contains("parcel_simulations_running{site=\"hub-1\"} 3"));
        assert!(output.contains("parcel_streams_active{site=\"hub-1\"} 1"));
        assert!(output.contains("# TYPE parcel_transition_latency_us histogram"));
    }
}
