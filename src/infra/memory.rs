use crate::app::ports::{StagingSink, WarehouseMerger};
use crate::constants::DEFAULT_STAGING_TABLE;
use crate::error::{EtlError, Result};
use crate::infra::procedures;
use crate::types::AdmissionRecord;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// In-memory staging + warehouse for development/testing.
///
/// Merging upserts staged rows by `SourceAdmissionID`, the same policy as the
/// bundled SQLite procedure.
pub struct InMemoryWarehouse {
    staging_table: String,
    staging: Arc<Mutex<HashMap<String, Vec<AdmissionRecord>>>>,
    facts: Arc<Mutex<BTreeMap<String, AdmissionRecord>>>,
    replace_calls: Arc<Mutex<usize>>,
    merge_calls: Arc<Mutex<usize>>,
    fail_staging: Option<String>,
    fail_merge: Option<String>,
}

impl Default for InMemoryWarehouse {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryWarehouse {
    pub fn new() -> Self {
        Self {
            staging_table: DEFAULT_STAGING_TABLE.to_string(),
            staging: Arc::new(Mutex::new(HashMap::new())),
            facts: Arc::new(Mutex::new(BTreeMap::new())),
            replace_calls: Arc::new(Mutex::new(0)),
            merge_calls: Arc::new(Mutex::new(0)),
            fail_staging: None,
            fail_merge: None,
        }
    }

    /// Every `replace` fails with `message`, leaving staging untouched.
    pub fn failing_staging(message: &str) -> Self {
        Self {
            fail_staging: Some(message.to_string()),
            ..Self::new()
        }
    }

    /// Every `merge` fails with `message`, leaving the warehouse untouched.
    pub fn failing_merge(message: &str) -> Self {
        Self {
            fail_merge: Some(message.to_string()),
            ..Self::new()
        }
    }

    pub fn staged(&self, destination: &str) -> Vec<AdmissionRecord> {
        self.staging
            .lock()
            .unwrap()
            .get(destination)
            .cloned()
            .unwrap_or_default()
    }

    /// Warehouse rows ordered by business key.
    pub fn facts(&self) -> Vec<AdmissionRecord> {
        self.facts.lock().unwrap().values().cloned().collect()
    }

    pub fn replace_calls(&self) -> usize {
        *self.replace_calls.lock().unwrap()
    }

    pub fn merge_calls(&self) -> usize {
        *self.merge_calls.lock().unwrap()
    }
}

#[async_trait]
impl StagingSink for InMemoryWarehouse {
    async fn replace(&self, destination: &str, batch: &[AdmissionRecord]) -> Result<()> {
        *self.replace_calls.lock().unwrap() += 1;
        if let Some(message) = &self.fail_staging {
            return Err(EtlError::Sink(message.clone()));
        }
        procedures::check_destination(destination, &self.staging_table)?;

        let mut staging = self.staging.lock().unwrap();
        staging.insert(destination.to_string(), batch.to_vec());

        debug!("Staged {} rows in {}", batch.len(), destination);
        Ok(())
    }
}

#[async_trait]
impl WarehouseMerger for InMemoryWarehouse {
    async fn merge(&self) -> Result<()> {
        *self.merge_calls.lock().unwrap() += 1;
        if let Some(message) = &self.fail_merge {
            return Err(EtlError::Merge(message.clone()));
        }

        let keyed = self
            .staged(&self.staging_table)
            .into_iter()
            .map(|record| match record.source_admission_id.clone() {
                Some(key) => Ok((key, record)),
                None => Err(EtlError::Merge(
                    "staged row without SourceAdmissionID".to_string(),
                )),
            })
            .collect::<Result<Vec<_>>>()?;

        let mut facts = self.facts.lock().unwrap();
        facts.extend(keyed);

        debug!("Warehouse now holds {} admissions", facts.len());
        Ok(())
    }
}
