//! Prometheus metrics for queue workers and request handling
//!
//! Collectors register with the default registry on first use and are
//! rendered in text exposition format by [`gather`].

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge_vec, Encoder,
    HistogramVec, IntCounterVec, IntGaugeVec, TextEncoder,
};
use std::time::Duration;

use crate::queue::{OperationKind, QueueSnapshot};
use crate::status::IndexStatus;

lazy_static! {
    /// Completed restore/delete attempts by outcome
    static ref OPERATIONS: IntCounterVec = register_int_counter_vec!(
        "esio_operations_total",
        "Total number of restore and delete operations",
        &["kind", "outcome"]
    ).expect("esio_operations_total registers once");

    /// Wall time of remote restore/delete calls
    static ref OPERATION_DURATION: HistogramVec = register_histogram_vec!(
        "esio_operation_duration_seconds",
        "Restore and delete call duration in seconds",
        &["kind"],
        vec![0.1, 0.5, 1.0, 5.0, 30.0, 60.0, 300.0, 900.0, 3600.0]
    ).expect("esio_operation_duration_seconds registers once");

    static ref QUEUE_BACKLOG: IntGaugeVec = register_int_gauge_vec!(
        "esio_queue_backlog",
        "Entries awaiting service",
        &["kind"]
    ).expect("esio_queue_backlog registers once");

    static ref QUEUE_IN_SERVICE: IntGaugeVec = register_int_gauge_vec!(
        "esio_queue_in_service",
        "Entries currently being serviced",
        &["kind"]
    ).expect("esio_queue_in_service registers once");

    /// Per-index classifications produced by reconciliation
    static ref CLASSIFICATIONS: IntCounterVec = register_int_counter_vec!(
        "esio_classifications_total",
        "Index classifications produced by reconciliation",
        &["status"]
    ).expect("esio_classifications_total registers once");

    static ref REQUESTS: IntCounterVec = register_int_counter_vec!(
        "esio_requests_total",
        "Orchestrator requests by method and result",
        &["method", "result"]
    ).expect("esio_requests_total registers once");
}

/// Record the result of one remote operation
pub fn record_operation(kind: OperationKind, outcome: &str, duration: Duration) {
    OPERATIONS.with_label_values(&[kind.as_str(), outcome]).inc();
    OPERATION_DURATION
        .with_label_values(&[kind.as_str()])
        .observe(duration.as_secs_f64());
}

/// Publish queue depth gauges
pub fn record_queue(snapshot: QueueSnapshot) {
    let kind = snapshot.kind.as_str();
    QUEUE_BACKLOG
        .with_label_values(&[kind])
        .set(snapshot.backlog as i64);
    QUEUE_IN_SERVICE
        .with_label_values(&[kind])
        .set(snapshot.in_service as i64);
}

/// Count the classifications produced by one reconciliation
pub fn record_classification(status: &IndexStatus) {
    for (label, count) in [
        ("ready", status.ready.len()),
        ("pending", status.pending.len()),
        ("restoring", status.restoring.len()),
        ("deleting", status.deleting.len()),
    ] {
        CLASSIFICATIONS
            .with_label_values(&[label])
            .inc_by(count as u64);
    }
}

/// Count one handled request by method and result
pub fn record_request(method: &str, result: &str) {
    REQUESTS.with_label_values(&[method, result]).inc();
}

/// Render all registered metrics in Prometheus text format
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&families, &mut buffer) {
        tracing::warn!(error = %err, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_contains_recorded_series() {
        record_operation(OperationKind::Restore, "success", Duration::from_millis(5));
        record_request("GET", "success");
        record_queue(QueueSnapshot {
            kind: OperationKind::Delete,
            backlog: 3,
            in_service: 1,
            max_concurrent: 1,
        });

        let text = gather();
        assert!(text.contains("esio_operations_total"));
        assert!(text.contains("esio_requests_total"));
        assert!(text.contains("esio_queue_backlog{kind=\"delete\"}"));
    }
}
