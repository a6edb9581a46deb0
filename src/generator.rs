//! Synthetic admission batches for exercising the pipeline end to end.

use crate::constants::{INPUT_COLUMNS, INPUT_DATE_FORMAT};
use crate::error::{EtlError, Result};
use crate::types::AdmissionRecord;
use chrono::{Duration, NaiveDate};
use rand::seq::SliceRandom;
use rand::Rng;
use std::io::Write;

const FIRST_NAMES: &[&str] = &["John", "Jane", "Robert", "Emily", "Michael", "Sarah", "David", "Laura"];
const LAST_NAMES: &[&str] = &["Smith", "Johnson", "Williams", "Brown", "Jones", "Garcia", "Miller"];
const HOSPITAL_NAMES: &[&str] = &["City", "General", "Mercy", "St. Jude", "Community"];
const HOSPITAL_SUFFIXES: &[&str] = &["Hospital", "Clinic", "Medical Center"];
const BLOOD_TYPES: &[&str] = &["A+", "A-", "B+", "B-", "AB+", "AB-", "O+", "O-"];
const MEDICAL_CONDITIONS: &[&str] = &["Diabetes", "Cancer", "Obesity", "Arthritis", "Hypertension"];
const INSURANCE_PROVIDERS: &[&str] = &["Medicare", "Aetna", "Blue Cross", "Cigna", "UnitedHealthcare"];
const ADMISSION_TYPES: &[&str] = &["Urgent", "Emergency", "Elective"];
const MEDICATIONS: &[&str] = &["Paracetamol", "Ibuprofen", "Aspirin", "Penicillin", "Lipitor"];
const TEST_RESULTS: &[&str] = &["Normal", "Abnormal", "Inconclusive"];
const GENDERS: &[&str] = &["Male", "Female"];

/// Earliest generated admission date.
pub fn earliest_admission() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 1).unwrap_or(NaiveDate::MIN)
}

fn pick<R: Rng>(rng: &mut R, options: &[&str]) -> String {
    options.choose(rng).copied().unwrap_or_default().to_string()
}

fn person<R: Rng>(rng: &mut R) -> String {
    format!("{} {}", pick(rng, FIRST_NAMES), pick(rng, LAST_NAMES))
}

fn random_date<R: Rng>(rng: &mut R, start: NaiveDate, end: NaiveDate) -> NaiveDate {
    let days = (end - start).num_days().max(0);
    start + Duration::days(rng.gen_range(0..=days))
}

pub fn generate_row<R: Rng>(rng: &mut R, today: NaiveDate) -> AdmissionRecord {
    let admitted = random_date(rng, earliest_admission(), today);
    let discharged = admitted + Duration::days(rng.gen_range(1..=15));
    let billing: f64 = rng.gen_range(1000.0..50000.0);

    AdmissionRecord {
        name: person(rng),
        age: Some(rng.gen_range(18..=90)),
        gender: Some(pick(rng, GENDERS)),
        blood_type: Some(pick(rng, BLOOD_TYPES)),
        medical_condition: Some(pick(rng, MEDICAL_CONDITIONS)),
        date_of_admission: admitted,
        doctor: Some(format!("Dr. {}", person(rng))),
        hospital: Some(format!(
            "{} {}",
            pick(rng, HOSPITAL_NAMES),
            pick(rng, HOSPITAL_SUFFIXES)
        )),
        insurance_provider: Some(pick(rng, INSURANCE_PROVIDERS)),
        billing_amount: Some((billing * 100.0).round() / 100.0),
        room_number: Some(rng.gen_range(100..=599).to_string()),
        admission_type: Some(pick(rng, ADMISSION_TYPES)),
        discharge_date: Some(discharged),
        medication: Some(pick(rng, MEDICATIONS)),
        test_results: Some(pick(rng, TEST_RESULTS)),
        source_admission_id: None,
    }
}

pub fn generate_rows<R: Rng>(n: usize, rng: &mut R, today: NaiveDate) -> Vec<AdmissionRecord> {
    (0..n).map(|_| generate_row(rng, today)).collect()
}

/// Write records as an upload-ready CSV: spaced headers ("Date of
/// Admission") and `MM/DD/YYYY` dates, the shape operators export.
pub fn write_csv<W: Write>(records: &[AdmissionRecord], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(INPUT_COLUMNS.iter().map(|c| c.replace('_', " ")))?;

    let text = |v: &Option<String>| v.clone().unwrap_or_default();
    for r in records {
        wtr.write_record([
            r.name.clone(),
            r.age.map(|a| a.to_string()).unwrap_or_default(),
            text(&r.gender),
            text(&r.blood_type),
            text(&r.medical_condition),
            r.date_of_admission.format(INPUT_DATE_FORMAT).to_string(),
            text(&r.doctor),
            text(&r.hospital),
            text(&r.insurance_provider),
            r.billing_amount.map(|b| format!("{b:.2}")).unwrap_or_default(),
            text(&r.room_number),
            text(&r.admission_type),
            r.discharge_date
                .map(|d| d.format(INPUT_DATE_FORMAT).to_string())
                .unwrap_or_default(),
            text(&r.medication),
            text(&r.test_results),
        ])?;
    }
    wtr.flush().map_err(EtlError::Io)?;
    Ok(())
}
