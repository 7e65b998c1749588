//! Prometheus metrics for the worker.

use std::net::{Ipv4Addr, SocketAddr};

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{info, warn};

use reel_models::Outcome;

/// Metric names as constants for consistency.
pub mod names {
    // Row metrics
    pub const ROWS_TOTAL: &str = "pagereel_rows_total";
    pub const ROW_DURATION_SECONDS: &str = "pagereel_row_duration_seconds";
    pub const ROWS_REMAINING: &str = "pagereel_rows_remaining";

    // Stage metrics
    pub const CAPTURE_DURATION_SECONDS: &str = "pagereel_capture_duration_seconds";
    pub const UPLOAD_DURATION_SECONDS: &str = "pagereel_upload_duration_seconds";
    pub const BROWSER_RECYCLES_TOTAL: &str = "pagereel_browser_recycles_total";

    // Coordination metrics
    pub const PROGRESS_PERSIST_FAILURES_TOTAL: &str = "pagereel_progress_persist_failures_total";
    pub const MERGED_RECORDS: &str = "pagereel_merged_records";
}

/// Install the Prometheus recorder with an HTTP listener on `port`.
///
/// Without a port nothing is installed and every metric call is a no-op.
pub fn init_metrics(port: Option<u16>) {
    let Some(port) = port else {
        return;
    };

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => info!("Prometheus metrics listening on {}", addr),
        Err(e) => warn!("Failed to install Prometheus exporter: {}", e),
    }
}

/// Record a finished row.
pub fn record_row(outcome: &Outcome, duration_secs: f64) {
    let status = if outcome.is_completed() {
        "completed"
    } else if outcome.is_skipped() {
        "skipped"
    } else {
        "failed"
    };
    let labels = [("status", status.to_string())];

    counter!(names::ROWS_TOTAL, &labels).increment(1);
    if !outcome.is_skipped() {
        histogram!(names::ROW_DURATION_SECONDS, &labels).record(duration_secs);
    }
}

pub fn set_rows_remaining(remaining: u64) {
    gauge!(names::ROWS_REMAINING).set(remaining as f64);
}

pub fn record_capture(duration_secs: f64) {
    histogram!(names::CAPTURE_DURATION_SECONDS).record(duration_secs);
}

pub fn record_upload(artifact: &'static str, duration_secs: f64) {
    histogram!(names::UPLOAD_DURATION_SECONDS, "artifact" => artifact).record(duration_secs);
}

pub fn record_browser_recycle() {
    counter!(names::BROWSER_RECYCLES_TOTAL).increment(1);
}

pub fn record_progress_persist_failure() {
    counter!(names::PROGRESS_PERSIST_FAILURES_TOTAL).increment(1);
}

pub fn set_merged_records(count: usize) {
    gauge!(names::MERGED_RECORDS).set(count as f64);
}
