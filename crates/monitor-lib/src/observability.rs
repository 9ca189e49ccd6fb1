//! Observability infrastructure for the flow monitor
//!
//! Provides:
//! - Prometheus metrics (scan and classification latency, row and attack counters,
//!   per-sink dispatch failures)
//! - Structured JSON logging with tracing

use crate::models::ClassificationResult;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Latency buckets in seconds; scoring a chunk can take a while
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<MonitorMetricsInner> = OnceLock::new();

struct MonitorMetricsInner {
    scan_latency_seconds: Histogram,
    classify_latency_seconds: Histogram,
    files_processed: IntCounterVec,
    rows_classified: IntCounter,
    attacks_detected: IntCounter,
    empty_batches: IntCounter,
    dispatch_failures: IntCounterVec,
    files_tracked: IntGauge,
}

impl MonitorMetricsInner {
    fn new() -> Self {
        Self {
            scan_latency_seconds: register_histogram!(
                "flow_monitor_scan_latency_seconds",
                "Time spent on one full directory scan",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register scan_latency_seconds"),

            classify_latency_seconds: register_histogram!(
                "flow_monitor_classify_latency_seconds",
                "Time spent scoring one chunk with both models",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register classify_latency_seconds"),

            files_processed: register_int_counter_vec!(
                "flow_monitor_files_processed_total",
                "Per-file processing attempts by outcome",
                &["outcome"]
            )
            .expect("Failed to register files_processed"),

            rows_classified: register_int_counter!(
                "flow_monitor_rows_classified_total",
                "Total number of flow rows classified"
            )
            .expect("Failed to register rows_classified"),

            attacks_detected: register_int_counter!(
                "flow_monitor_attacks_detected_total",
                "Total number of flows classified as ATTACK"
            )
            .expect("Failed to register attacks_detected"),

            empty_batches: register_int_counter!(
                "flow_monitor_empty_batches_total",
                "New row ranges where every row was dropped during cleaning"
            )
            .expect("Failed to register empty_batches"),

            dispatch_failures: register_int_counter_vec!(
                "flow_monitor_dispatch_failures_total",
                "Failed deliveries by sink",
                &["sink"]
            )
            .expect("Failed to register dispatch_failures"),

            files_tracked: register_int_gauge!(
                "flow_monitor_files_tracked",
                "Number of files with a progress cursor"
            )
            .expect("Failed to register files_tracked"),
        }
    }
}

/// Monitor metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct MonitorMetrics {
    _private: (),
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &MonitorMetricsInner {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new)
    }

    pub fn observe_scan_latency(&self, duration_secs: f64) {
        self.inner().scan_latency_seconds.observe(duration_secs);
    }

    pub fn observe_classify_latency(&self, duration_secs: f64) {
        self.inner().classify_latency_seconds.observe(duration_secs);
    }

    /// Count one per-file outcome (`processed`, `unchanged`, `empty`, or an error kind)
    pub fn inc_file_outcome(&self, outcome: &str) {
        self.inner()
            .files_processed
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn inc_rows_classified(&self, rows: u64) {
        self.inner().rows_classified.inc_by(rows);
    }

    pub fn inc_attacks_detected(&self) {
        self.inner().attacks_detected.inc();
    }

    pub fn inc_empty_batches(&self) {
        self.inner().empty_batches.inc();
    }

    /// Count a failed delivery to `sink` (`log`, `store` or `aggregator`)
    pub fn inc_dispatch_failure(&self, sink: &str) {
        self.inner()
            .dispatch_failures
            .with_label_values(&[sink])
            .inc();
    }

    pub fn set_files_tracked(&self, count: i64) {
        self.inner().files_tracked.set(count);
    }

    pub fn dispatch_failures(&self, sink: &str) -> u64 {
        self.inner()
            .dispatch_failures
            .with_label_values(&[sink])
            .get()
    }
}

/// Structured logger for monitor events
///
/// Provides consistent JSON-formatted logging for detections, per-file
/// progress and lifecycle events.
#[derive(Clone)]
pub struct StructuredLogger {
    host: String,
}

impl StructuredLogger {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    /// Console alert for a flow classified as ATTACK
    pub fn log_attack(&self, result: &ClassificationResult) {
        warn!(
            event = "attack_detected",
            host = %self.host,
            source_file = %result.file_name(),
            flow_index = result.flow_index,
            rf_prob = result.rf_prob,
            xgb_prob = result.xgb_prob,
            rf_label = %result.rf_label,
            xgb_label = %result.xgb_label,
            "ALERT {} row {}: RF={}({:.3}), XGB={}({:.3})",
            result.file_name(),
            result.flow_index,
            result.rf_label,
            result.rf_prob,
            result.xgb_label,
            result.xgb_prob
        );
    }

    /// Log a file whose new rows were classified and committed
    pub fn log_file_processed(&self, path: &str, start: u64, total: u64, classified: usize) {
        info!(
            event = "file_processed",
            host = %self.host,
            path = %path,
            start_row = start,
            total_rows = total,
            classified = classified,
            "Processed new flow rows"
        );
    }

    /// Log a file whose new rows were all dropped during cleaning
    pub fn log_empty_batch(&self, path: &str, start: u64, total: u64) {
        info!(
            event = "empty_after_normalization",
            host = %self.host,
            path = %path,
            start_row = start,
            total_rows = total,
            "No usable rows after cleaning, cursor advanced"
        );
    }

    pub fn log_startup(&self, version: &str, watch_dir: &str, features: usize) {
        info!(
            event = "monitor_started",
            host = %self.host,
            monitor_version = %version,
            watch_dir = %watch_dir,
            features = features,
            "Flow monitor started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "monitor_shutdown",
            host = %self.host,
            reason = %reason,
            "Flow monitor shutting down"
        );
    }
}
