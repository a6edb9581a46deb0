//! Cleaner stage: trim text, coerce typed fields, and drop rows that lack a
//! name or admission date.
//!
//! A value that fails coercion becomes `None` and is counted; it never fails
//! the batch. The only errors raised here are for required columns missing
//! from the header altogether.

use crate::constants::{self, INPUT_DATE_FORMAT, REQUIRED_COLUMNS};
use crate::error::{EtlError, Result};
use crate::pipeline::loader::RawTable;
use crate::types::AdmissionRecord;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, instrument};

static CURRENCY_NOISE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[$,]").expect("valid regex"));
// chrono's `%Y` takes any digit count and a sign, so the shape is checked first
static INPUT_DATE_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,2}/\d{1,2}/\d{4}$").expect("valid regex"));

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanReport {
    pub input_rows: usize,
    pub output_rows: usize,
    /// Rows dropped because Name or Date_of_Admission was null after coercion
    pub dropped_missing_required: usize,
    /// Non-null values that failed coercion, by column
    pub coerced_to_null: BTreeMap<&'static str, usize>,
}

impl CleanReport {
    fn coerce_failed(&mut self, column: &'static str) {
        *self.coerced_to_null.entry(column).or_insert(0) += 1;
    }
}

/// Trim a text cell; blank after trimming reads as null.
pub fn clean_text(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Strip `$` and thousands separators, then parse as a decimal amount.
pub fn parse_billing_amount(raw: &str) -> Option<f64> {
    let stripped = CURRENCY_NOISE.replace_all(raw.trim(), "");
    stripped
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Parse a non-negative whole age. `"40.0"` is accepted as 40.
pub fn parse_age(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    if let Ok(age) = raw.parse::<u32>() {
        return Some(age);
    }
    let value = raw.parse::<f64>().ok()?;
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64 {
        Some(value as u32)
    } else {
        None
    }
}

/// Parse a date in the fixed external `MM/DD/YYYY` format.
pub fn parse_input_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if !INPUT_DATE_SHAPE.is_match(raw) {
        return None;
    }
    NaiveDate::parse_from_str(raw, INPUT_DATE_FORMAT).ok()
}

/// Column lookup over one raw row; absent columns read as null.
struct RowView<'a> {
    table: &'a RawTable,
    row: &'a [Option<String>],
}

impl<'a> RowView<'a> {
    fn get(&self, column: &str) -> Option<&'a str> {
        let idx = self.table.column_index(column)?;
        self.row.get(idx)?.as_deref()
    }

    fn text(&self, column: &str) -> Option<String> {
        clean_text(self.get(column))
    }

    /// Coerce a trimmed cell with `parse`, counting failures in `report`.
    fn coerce<T>(
        &self,
        column: &'static str,
        report: &mut CleanReport,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Option<T> {
        let text = self.text(column)?;
        let parsed = parse(&text);
        if parsed.is_none() {
            report.coerce_failed(column);
        }
        parsed
    }
}

#[instrument(skip(table), fields(rows = table.len()))]
pub fn clean(table: &RawTable) -> Result<(Vec<AdmissionRecord>, CleanReport)> {
    for required in REQUIRED_COLUMNS {
        if table.column_index(required).is_none() {
            return Err(EtlError::MissingColumn(required.to_string()));
        }
    }

    let mut report = CleanReport {
        input_rows: table.len(),
        ..Default::default()
    };
    let mut records = Vec::with_capacity(table.len());

    for row in &table.rows {
        let view = RowView { table, row };

        let age = view.coerce(constants::AGE, &mut report, parse_age);
        let billing_amount =
            view.coerce(constants::BILLING_AMOUNT, &mut report, parse_billing_amount);
        let date_of_admission =
            view.coerce(constants::DATE_OF_ADMISSION, &mut report, parse_input_date);
        let discharge_date = view.coerce(constants::DISCHARGE_DATE, &mut report, parse_input_date);

        let (Some(name), Some(date_of_admission)) = (view.text(constants::NAME), date_of_admission)
        else {
            report.dropped_missing_required += 1;
            continue;
        };

        records.push(AdmissionRecord {
            name,
            age,
            gender: view.text(constants::GENDER),
            blood_type: view.text(constants::BLOOD_TYPE),
            medical_condition: view.text(constants::MEDICAL_CONDITION),
            date_of_admission,
            doctor: view.text(constants::DOCTOR),
            hospital: view.text(constants::HOSPITAL),
            insurance_provider: view.text(constants::INSURANCE_PROVIDER),
            billing_amount,
            room_number: view.text(constants::ROOM_NUMBER),
            admission_type: view.text(constants::ADMISSION_TYPE),
            discharge_date,
            medication: view.text(constants::MEDICATION),
            test_results: view.text(constants::TEST_RESULTS),
            source_admission_id: None,
        });
    }

    report.output_rows = records.len();
    if report.dropped_missing_required > 0 {
        info!(
            "Dropped {} rows due to missing Name or Admission Date",
            report.dropped_missing_required
        );
    }

    Ok((records, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::loader::load_csv;

    fn clean_csv(csv: &str) -> (Vec<AdmissionRecord>, CleanReport) {
        let (table, _) = load_csv(csv.as_bytes()).unwrap();
        clean(&table).unwrap()
    }

    #[test]
    fn test_billing_amount_coercion() {
        assert_eq!(parse_billing_amount("$1,234.50"), Some(1234.50));
        assert_eq!(parse_billing_amount(" 99 "), Some(99.0));
        assert_eq!(parse_billing_amount("abc"), None);
        assert_eq!(parse_billing_amount("NaN"), None);
        assert_eq!(parse_billing_amount("inf"), None);
    }

    #[test]
    fn test_age_coercion() {
        assert_eq!(parse_age("40"), Some(40));
        assert_eq!(parse_age("40.0"), Some(40));
        assert_eq!(parse_age("40.5"), None);
        assert_eq!(parse_age("-3"), None);
        assert_eq!(parse_age("forty"), None);
    }

    #[test]
    fn test_date_coercion() {
        assert_eq!(
            parse_input_date("01/15/2024"),
            NaiveDate::from_ymd_opt(2024, 1, 15)
        );
        assert_eq!(parse_input_date("13/40/2024"), None);
        assert_eq!(parse_input_date("02/30/2024"), None);
        assert_eq!(parse_input_date("2024-01-15"), None);
        assert_eq!(parse_input_date("01/15/24"), None);
        assert_eq!(parse_input_date("01/15/+2024"), None);
        assert_eq!(parse_input_date("01/ 15/2024"), None);
        assert_eq!(parse_input_date("01/15/20245"), None);
        assert_eq!(
            parse_input_date(" 1/5/2024 "),
            NaiveDate::from_ymd_opt(2024, 1, 5)
        );
    }

    #[test]
    fn test_two_digit_year_drops_row() {
        let csv = "Name,Date of Admission\nJane,01/15/24\nJohn,01/16/2024\n";
        let (records, report) = clean_csv(csv);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "John");
        assert_eq!(report.dropped_missing_required, 1);
        assert_eq!(
            report.coerced_to_null.get(constants::DATE_OF_ADMISSION),
            Some(&1)
        );
    }

    #[test]
    fn test_bad_billing_keeps_row() {
        let csv = "Name,Date of Admission,Billing Amount\nJane,01/15/2024,abc\nJohn,01/16/2024,\"$1,234.50\"\n";
        let (records, report) = clean_csv(csv);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].billing_amount, None);
        assert_eq!(records[1].billing_amount, Some(1234.50));
        assert_eq!(report.coerced_to_null.get(constants::BILLING_AMOUNT), Some(&1));
        assert_eq!(report.dropped_missing_required, 0);
    }

    #[test]
    fn test_invalid_admission_date_drops_row() {
        let csv = "Name,Date of Admission\nJane,13/40/2024\nJohn,01/16/2024\n";
        let (records, report) = clean_csv(csv);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "John");
        assert_eq!(report.dropped_missing_required, 1);
    }

    #[test]
    fn test_blank_name_drops_row() {
        let csv = "Name,Date of Admission\n   ,01/15/2024\n,01/15/2024\n";
        let (records, report) = clean_csv(csv);

        assert!(records.is_empty());
        assert_eq!(report.dropped_missing_required, 2);
    }

    #[test]
    fn test_text_fields_trimmed() {
        let csv = "Name,Date of Admission,Doctor,Hospital\n  Jane Doe ,01/15/2024, Dr. Smith ,  \n";
        let (records, _) = clean_csv(csv);

        assert_eq!(records[0].name, "Jane Doe");
        assert_eq!(records[0].doctor.as_deref(), Some("Dr. Smith"));
        assert_eq!(records[0].hospital, None);
    }

    #[test]
    fn test_missing_required_column_is_error() {
        let (table, _) = load_csv(b"Name,Age\nJane,40\n").unwrap();
        let err = clean(&table).unwrap_err();
        assert!(matches!(err, EtlError::MissingColumn(c) if c == "Date_of_Admission"));
    }

    #[test]
    fn test_optional_columns_may_be_absent() {
        let (records, report) = clean_csv("Name,Date of Admission\nJane,01/15/2024\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].age, None);
        assert!(report.coerced_to_null.is_empty());
    }
}
