//! Admission batch pipeline: load, clean, deduplicate, key, then hand off to
//! the staging sink and warehouse merger.

pub mod cleaner;
pub mod dedup;
pub mod keyer;
pub mod loader;

use crate::app::ports::{StagingSink, WarehouseMerger};
use crate::constants::NO_VALID_DATA;
use crate::error::{EtlError, Result};
use crate::metrics::PipelineMetrics;
use crate::schema;
use crate::types::AdmissionRecord;
use cleaner::CleanReport;
use dedup::DedupReport;
use loader::LoadReport;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Counts from every stage of one run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub batch_id: Uuid,
    pub schema_version: u32,
    pub load: LoadReport,
    pub clean: CleanReport,
    pub dedup: DedupReport,
    /// Surviving rows whose business key repeats an earlier row's
    pub shared_keys: usize,
    pub records: usize,
}

/// A cleaned, deduplicated and keyed batch, ready for staging.
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    pub records: Vec<AdmissionRecord>,
    pub report: PipelineReport,
}

/// Result of a full run as seen by callers (CLI, upload server).
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub ok: bool,
    pub message: String,
    pub report: Option<PipelineReport>,
}

impl RunOutcome {
    fn failed(message: impl Into<String>, report: Option<PipelineReport>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            report,
        }
    }
}

pub struct Pipeline {
    staging: Arc<dyn StagingSink>,
    merger: Arc<dyn WarehouseMerger>,
    staging_destination: String,
}

impl Pipeline {
    pub fn new(
        staging: Arc<dyn StagingSink>,
        merger: Arc<dyn WarehouseMerger>,
        staging_destination: impl Into<String>,
    ) -> Self {
        Self {
            staging,
            merger,
            staging_destination: staging_destination.into(),
        }
    }

    /// Run the pure stages over raw CSV bytes. Writes nothing.
    #[instrument(skip(bytes), fields(bytes = bytes.len()))]
    pub fn prepare(bytes: &[u8]) -> Result<PreparedBatch> {
        let batch_id = Uuid::new_v4();

        let t = Instant::now();
        let (table, load) = loader::load_csv(bytes)?;
        PipelineMetrics::record_stage_duration("load", t.elapsed().as_secs_f64());
        PipelineMetrics::record_load(load.rows_read, load.ignored_columns.len());

        let t = Instant::now();
        let (records, clean) = cleaner::clean(&table)?;
        PipelineMetrics::record_stage_duration("clean", t.elapsed().as_secs_f64());
        PipelineMetrics::record_clean(&clean);

        let t = Instant::now();
        let (mut records, dedup) = dedup::deduplicate(records);
        PipelineMetrics::record_stage_duration("dedup", t.elapsed().as_secs_f64());
        PipelineMetrics::record_dedup(&dedup);

        keyer::assign_keys(&mut records);
        schema::validate_batch(&records)?;

        let shared_keys = schema::shared_key_count(&records);
        if shared_keys > 0 {
            warn!(
                "{} rows share a SourceAdmissionID with an earlier row in the batch",
                shared_keys
            );
        }

        info!(
            "Validation complete. {} clean rows ready for staging",
            records.len()
        );

        let report = PipelineReport {
            batch_id,
            schema_version: schema::SCHEMA_VERSION,
            load,
            clean,
            dedup,
            shared_keys,
            records: records.len(),
        };
        Ok(PreparedBatch { records, report })
    }

    /// Full run: prepare, stage and merge.
    ///
    /// Never returns an error; every failure is folded into `ok = false` and
    /// a message. An empty batch stops before any database work.
    #[instrument(skip(self, bytes), fields(destination = %self.staging_destination))]
    pub async fn run(&self, bytes: &[u8]) -> RunOutcome {
        let started = Instant::now();
        let outcome = self.run_inner(bytes).await;

        let label = if outcome.ok { "success" } else { "failure" };
        let loaded = if outcome.ok {
            outcome.report.as_ref().map(|r| r.records).unwrap_or(0)
        } else {
            0
        };
        PipelineMetrics::record_run(label, loaded, started.elapsed().as_secs_f64());
        outcome
    }

    async fn run_inner(&self, bytes: &[u8]) -> RunOutcome {
        let prepared = match Self::prepare(bytes) {
            Ok(p) => p,
            Err(e) => {
                error!("ETL run failed before staging: {}", e);
                return RunOutcome::failed(e.to_string(), None);
            }
        };

        if prepared.records.is_empty() {
            warn!("ETL run halted: no valid data to load");
            return RunOutcome::failed(NO_VALID_DATA, Some(prepared.report));
        }

        if let Err(e) = self.stage(&prepared.records).await {
            error!("ETL run failed: {}", e);
            return RunOutcome::failed(e.to_string(), Some(prepared.report));
        }

        if let Err(e) = self.merge().await {
            error!("ETL run failed: {}", e);
            return RunOutcome::failed(e.to_string(), Some(prepared.report));
        }

        let n = prepared.records.len();
        info!("ETL run completed: {} records loaded", n);
        RunOutcome {
            ok: true,
            message: format!("{n} records loaded"),
            report: Some(prepared.report),
        }
    }

    /// Hand a keyed batch to the staging sink.
    pub async fn stage(&self, records: &[AdmissionRecord]) -> Result<()> {
        info!(
            "Loading {} rows to staging destination {}",
            records.len(),
            self.staging_destination
        );
        let t = Instant::now();
        self.staging
            .replace(&self.staging_destination, records)
            .await
            .map_err(|e| match e {
                EtlError::Sink(_) => e,
                other => EtlError::Sink(other.to_string()),
            })?;
        PipelineMetrics::record_stage_duration("stage", t.elapsed().as_secs_f64());
        Ok(())
    }

    /// Invoke the warehouse merge over whatever is staged.
    pub async fn merge(&self) -> Result<()> {
        let t = Instant::now();
        self.merger.merge().await.map_err(|e| match e {
            EtlError::Merge(_) => e,
            other => EtlError::Merge(other.to_string()),
        })?;
        PipelineMetrics::record_stage_duration("merge", t.elapsed().as_secs_f64());
        info!("Data warehouse merge completed");
        Ok(())
    }
}
