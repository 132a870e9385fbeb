//! Cleaning step metrics
//!
//! Counters and histograms go through the `metrics` facade. A Prometheus
//! recorder is installed in-process only; a short-lived step has nothing to
//! scrape, so `main` renders the registry to a textfile at the end of a run.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::warn;

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the recorder. Idempotent.
pub fn init_metrics() {
    if HANDLE.get().is_some() {
        return;
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = HANDLE.set(handle);
        }
        Err(e) => warn!("Prometheus recorder install failed (possibly already installed): {}", e),
    }
}

/// Prometheus text exposition of everything recorded so far, if a recorder is installed.
pub fn render() -> Option<String> {
    HANDLE.get().map(|h| h.render())
}

/// Rows remaining after a stage of the step.
pub fn rows_after_stage(stage: &'static str, rows: usize) {
    ::metrics::counter!("basic_cleaning_rows_total", "stage" => stage).increment(rows as u64);
}

pub fn review_dates_nulled(count: usize) {
    ::metrics::counter!("basic_cleaning_review_dates_nulled_total").increment(count as u64);
}

pub fn stage_duration(stage: &'static str, elapsed: Duration) {
    ::metrics::histogram!("basic_cleaning_stage_duration_seconds", "stage" => stage)
        .record(elapsed.as_secs_f64());
}

pub fn artifact_fetched(bytes: u64) {
    ::metrics::counter!("artifact_store_fetches_total").increment(1);
    ::metrics::counter!("artifact_store_fetched_bytes_total").increment(bytes);
}

pub fn artifact_published(deduplicated: bool) {
    let outcome = if deduplicated { "deduplicated" } else { "new_version" };
    ::metrics::counter!("artifact_store_publishes_total", "outcome" => outcome).increment(1);
}
