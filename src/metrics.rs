//! Pipeline metrics.
//!
//! Stages record through the `metrics` facade unconditionally; nothing is
//! exported unless `init_metrics` installed a Prometheus recorder (the
//! `serve` command does).

use crate::pipeline::cleaner::CleanReport;
use crate::pipeline::dedup::DedupReport;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use tracing::{info, warn};

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder once. Later calls are no-ops.
pub fn init_metrics() {
    if HANDLE.get().is_some() {
        return;
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if HANDLE.set(handle).is_ok() {
                info!("Prometheus recorder installed");
            }
        }
        Err(e) => {
            warn!("Failed to install Prometheus recorder: {}", e);
        }
    }
}

/// Render the current metrics in Prometheus text format.
pub fn render() -> Option<String> {
    HANDLE.get().map(|h| h.render())
}

pub struct PipelineMetrics;

impl PipelineMetrics {
    pub fn record_load(rows_read: usize, ignored_columns: usize) {
        ::metrics::counter!("etl_rows_read_total").increment(rows_read as u64);
        if ignored_columns > 0 {
            ::metrics::counter!("etl_ignored_columns_total").increment(ignored_columns as u64);
        }
    }

    pub fn record_clean(report: &CleanReport) {
        ::metrics::counter!("etl_rows_dropped_missing_required_total")
            .increment(report.dropped_missing_required as u64);
        for (column, count) in &report.coerced_to_null {
            ::metrics::counter!("etl_values_coerced_to_null_total", "column" => *column)
                .increment(*count as u64);
        }
    }

    pub fn record_dedup(report: &DedupReport) {
        ::metrics::counter!("etl_rows_exact_duplicates_total")
            .increment(report.exact_duplicates_removed as u64);
        ::metrics::counter!("etl_rows_age_consolidated_total")
            .increment(report.age_consolidated as u64);
    }

    pub fn record_run(outcome: &'static str, records_loaded: usize, duration_secs: f64) {
        ::metrics::counter!("etl_runs_total", "outcome" => outcome).increment(1);
        ::metrics::counter!("etl_records_loaded_total").increment(records_loaded as u64);
        ::metrics::histogram!("etl_run_duration_seconds").record(duration_secs);
    }

    pub fn record_stage_duration(stage: &'static str, duration_secs: f64) {
        ::metrics::histogram!("etl_stage_duration_seconds", "stage" => stage).record(duration_secs);
    }
}
