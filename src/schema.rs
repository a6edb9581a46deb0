//! Staging schema contract.
//!
//! The batch handed to a staging sink is a fixed, ordered set of columns.
//! Adapters bind `staging_row` values positionally against `STAGING_COLUMNS`
//! instead of mapping fields by name.

use crate::constants::{self, CANONICAL_DATE_FORMAT};
use crate::error::{EtlError, Result};
use crate::types::AdmissionRecord;
use std::collections::HashSet;

/// Bumped whenever `STAGING_COLUMNS` changes shape or order.
pub const SCHEMA_VERSION: u32 = 1;

pub const STAGING_COLUMNS: [&str; 16] = [
    constants::NAME,
    constants::AGE,
    constants::GENDER,
    constants::BLOOD_TYPE,
    constants::MEDICAL_CONDITION,
    constants::DATE_OF_ADMISSION,
    constants::DOCTOR,
    constants::HOSPITAL,
    constants::INSURANCE_PROVIDER,
    constants::BILLING_AMOUNT,
    constants::ROOM_NUMBER,
    constants::ADMISSION_TYPE,
    constants::DISCHARGE_DATE,
    constants::MEDICATION,
    constants::TEST_RESULTS,
    constants::SOURCE_ADMISSION_ID,
];

/// A single bound column value.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl From<Option<String>> for CellValue {
    fn from(v: Option<String>) -> Self {
        v.map(CellValue::Text).unwrap_or(CellValue::Null)
    }
}

impl From<Option<f64>> for CellValue {
    fn from(v: Option<f64>) -> Self {
        v.map(CellValue::Real).unwrap_or(CellValue::Null)
    }
}

impl From<Option<u32>> for CellValue {
    fn from(v: Option<u32>) -> Self {
        v.map(|n| CellValue::Integer(i64::from(n)))
            .unwrap_or(CellValue::Null)
    }
}

fn date_cell(d: Option<chrono::NaiveDate>) -> CellValue {
    d.map(|d| CellValue::Text(d.format(CANONICAL_DATE_FORMAT).to_string()))
        .unwrap_or(CellValue::Null)
}

/// Values for one record in `STAGING_COLUMNS` order.
pub fn staging_row(r: &AdmissionRecord) -> Vec<CellValue> {
    vec![
        CellValue::Text(r.name.clone()),
        r.age.into(),
        r.gender.clone().into(),
        r.blood_type.clone().into(),
        r.medical_condition.clone().into(),
        date_cell(Some(r.date_of_admission)),
        r.doctor.clone().into(),
        r.hospital.clone().into(),
        r.insurance_provider.clone().into(),
        r.billing_amount.into(),
        r.room_number.clone().into(),
        r.admission_type.clone().into(),
        date_cell(r.discharge_date),
        r.medication.clone().into(),
        r.test_results.clone().into(),
        r.source_admission_id.clone().into(),
    ]
}

fn is_business_key(key: &str) -> bool {
    key.len() == 64 && key.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Check a keyed batch against the staging contract before handoff.
pub fn validate_batch(batch: &[AdmissionRecord]) -> Result<()> {
    for (i, record) in batch.iter().enumerate() {
        let key = record.source_admission_id.as_deref().ok_or_else(|| {
            EtlError::Schema(format!("row {i} has no {}", constants::SOURCE_ADMISSION_ID))
        })?;
        if !is_business_key(key) {
            return Err(EtlError::Schema(format!(
                "row {i} has malformed {} '{key}'",
                constants::SOURCE_ADMISSION_ID
            )));
        }
        if record.name.trim().is_empty() {
            return Err(EtlError::Schema(format!("row {i} has an empty Name")));
        }
    }
    Ok(())
}

/// Records whose business key already appeared earlier in the batch.
///
/// These are distinct rows (they survived deduplication) that describe the
/// same admission event; the merge procedure decides which one wins.
pub fn shared_key_count(batch: &[AdmissionRecord]) -> usize {
    let mut seen = HashSet::with_capacity(batch.len());
    batch
        .iter()
        .filter_map(|r| r.source_admission_id.as_deref())
        .filter(|key| !seen.insert(*key))
        .count()
}
