//! Deduplicator stage.
//!
//! Two passes over a cleaned batch:
//! 1. exact duplicates collapse to their first occurrence;
//! 2. rows equal on every field except `Age` collapse into one row that keeps
//!    the first row's fields and the smallest non-null `Age` of the group.
//!
//! Output order follows the first occurrence of each surviving row.

use crate::types::AdmissionRecord;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{info, instrument};

#[derive(Debug, Clone, Default, Serialize)]
pub struct DedupReport {
    pub input_rows: usize,
    pub exact_duplicates_removed: usize,
    /// Rows folded into another row that differed only by Age
    pub age_consolidated: usize,
    pub output_rows: usize,
}

/// Every field except `Age` and the business key, borrowed from a record.
#[derive(Debug, PartialEq, Eq, Hash)]
struct GroupKey<'a> {
    name: &'a str,
    gender: Option<&'a str>,
    blood_type: Option<&'a str>,
    medical_condition: Option<&'a str>,
    date_of_admission: NaiveDate,
    doctor: Option<&'a str>,
    hospital: Option<&'a str>,
    insurance_provider: Option<&'a str>,
    billing_amount: Option<u64>,
    room_number: Option<&'a str>,
    admission_type: Option<&'a str>,
    discharge_date: Option<NaiveDate>,
    medication: Option<&'a str>,
    test_results: Option<&'a str>,
}

// f64 is not Hash; compare amounts by bit pattern with -0.0 folded into 0.0
fn amount_bits(amount: Option<f64>) -> Option<u64> {
    amount.map(|v| if v == 0.0 { 0.0f64.to_bits() } else { v.to_bits() })
}

impl<'a> GroupKey<'a> {
    fn of(r: &'a AdmissionRecord) -> Self {
        Self {
            name: &r.name,
            gender: r.gender.as_deref(),
            blood_type: r.blood_type.as_deref(),
            medical_condition: r.medical_condition.as_deref(),
            date_of_admission: r.date_of_admission,
            doctor: r.doctor.as_deref(),
            hospital: r.hospital.as_deref(),
            insurance_provider: r.insurance_provider.as_deref(),
            billing_amount: amount_bits(r.billing_amount),
            room_number: r.room_number.as_deref(),
            admission_type: r.admission_type.as_deref(),
            discharge_date: r.discharge_date,
            medication: r.medication.as_deref(),
            test_results: r.test_results.as_deref(),
        }
    }
}

struct Group {
    first: usize,
    min_age: Option<u32>,
}

fn min_age(a: Option<u32>, b: Option<u32>) -> Option<u32> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

#[instrument(skip(records), fields(rows = records.len()))]
pub fn deduplicate(records: Vec<AdmissionRecord>) -> (Vec<AdmissionRecord>, DedupReport) {
    let mut report = DedupReport {
        input_rows: records.len(),
        ..Default::default()
    };

    let groups: Vec<Group> = {
        // Pass 1: exact duplicates
        let mut seen: HashSet<(GroupKey<'_>, Option<u32>)> = HashSet::new();
        let distinct: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|&(_, r)| seen.insert((GroupKey::of(r), r.age)))
            .map(|(i, _)| i)
            .collect();
        report.exact_duplicates_removed = records.len() - distinct.len();

        // Pass 2: group on everything but Age
        let mut slots: HashMap<GroupKey<'_>, usize> = HashMap::new();
        let mut groups: Vec<Group> = Vec::new();
        for idx in distinct.iter().copied() {
            let record = &records[idx];
            match slots.get(&GroupKey::of(record)) {
                Some(&slot) => {
                    groups[slot].min_age = min_age(groups[slot].min_age, record.age);
                }
                None => {
                    slots.insert(GroupKey::of(record), groups.len());
                    groups.push(Group {
                        first: idx,
                        min_age: record.age,
                    });
                }
            }
        }
        report.age_consolidated = distinct.len() - groups.len();
        groups
    };

    let mut slots: Vec<Option<AdmissionRecord>> = records.into_iter().map(Some).collect();
    let output: Vec<AdmissionRecord> = groups
        .into_iter()
        .filter_map(|group| {
            slots[group.first].take().map(|mut record| {
                record.age = group.min_age;
                record
            })
        })
        .collect();

    report.output_rows = output.len();
    if report.exact_duplicates_removed > 0 {
        info!(
            "Dropped {} fully duplicate rows",
            report.exact_duplicates_removed
        );
    }
    if report.age_consolidated > 0 {
        info!(
            "Consolidated {} rows based on minimum age",
            report.age_consolidated
        );
    }

    (output, report)
}
