//! SQL for the bundled warehouse schema and its named merge procedures.
//!
//! SQLite has no stored procedures, so a procedure here is a named SQL script
//! run inside one transaction by the adapter.

use crate::constants::{self, DEFAULT_MERGE_PROCEDURE, FACT_TABLE};
use crate::error::{EtlError, Result};
use crate::schema::STAGING_COLUMNS;
use once_cell::sync::Lazy;
use regex::Regex;

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,63}$").expect("valid regex"));

/// Table and procedure names are interpolated into SQL, so only plain
/// identifiers are accepted.
pub fn validate_identifier(name: &str) -> Result<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(EtlError::Config(format!("'{name}' is not a valid SQL identifier")))
    }
}

/// A merger folds only the staging table it was opened on, so the sink
/// refuses any other destination.
pub fn check_destination(destination: &str, staging_table: &str) -> Result<()> {
    if destination == staging_table {
        Ok(())
    } else {
        Err(EtlError::Sink(format!(
            "destination '{destination}' is not the configured staging table '{staging_table}'"
        )))
    }
}

fn column_type(column: &str) -> &'static str {
    match column {
        constants::NAME | constants::DATE_OF_ADMISSION | constants::SOURCE_ADMISSION_ID => {
            "TEXT NOT NULL"
        }
        constants::AGE => "INTEGER",
        constants::BILLING_AMOUNT => "REAL",
        _ => "TEXT",
    }
}

fn column_defs() -> String {
    STAGING_COLUMNS
        .iter()
        .map(|c| format!("    {c} {}", column_type(c)))
        .collect::<Vec<_>>()
        .join(",\n")
}

pub fn column_list() -> String {
    STAGING_COLUMNS.join(", ")
}

pub fn staging_ddl(staging_table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {staging_table} (\n{}\n);",
        column_defs()
    )
}

pub fn fact_ddl() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {FACT_TABLE} (\n{},\n    LoadedAt TEXT NOT NULL,\n    PRIMARY KEY ({})\n);",
        column_defs(),
        constants::SOURCE_ADMISSION_ID
    )
}

/// Multi-row insert with positional placeholders for `rows` records.
pub fn insert_sql(staging_table: &str, rows: usize) -> String {
    let one_row = format!("({})", vec!["?"; STAGING_COLUMNS.len()].join(", "));
    let values = vec![one_row; rows].join(", ");
    format!(
        "INSERT INTO {staging_table} ({}) VALUES {values}",
        column_list()
    )
}

/// Incremental load: upsert every staged row into the fact table by
/// SourceAdmissionID. When a batch stages the same key twice the later row
/// wins.
fn load_incremental_sql(staging_table: &str) -> String {
    let updates = STAGING_COLUMNS
        .iter()
        .filter(|c| **c != constants::SOURCE_ADMISSION_ID)
        .map(|c| format!("{c} = excluded.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {FACT_TABLE} ({cols}, LoadedAt)\n\
         SELECT {cols}, datetime('now') FROM {staging_table} WHERE true\n\
         ON CONFLICT({key}) DO UPDATE SET {updates}, LoadedAt = excluded.LoadedAt;",
        cols = column_list(),
        key = constants::SOURCE_ADMISSION_ID,
    )
}

/// Resolve a procedure name to its SQL script.
pub fn procedure_sql(procedure: &str, staging_table: &str) -> Result<String> {
    match procedure {
        DEFAULT_MERGE_PROCEDURE => Ok(load_incremental_sql(staging_table)),
        other => Err(EtlError::Merge(format!("unknown procedure '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers() {
        assert!(validate_identifier("Staging_Admissions").is_ok());
        assert!(validate_identifier("staging; DROP TABLE x").is_err());
        assert!(validate_identifier("1table").is_err());
        assert!(validate_identifier("").is_err());
    }

    #[test]
    fn test_destination_must_match_staging_table() {
        assert!(check_destination("Staging_Admissions", "Staging_Admissions").is_ok());
        assert!(matches!(
            check_destination("Staging_Other", "Staging_Admissions"),
            Err(EtlError::Sink(_))
        ));
    }

    #[test]
    fn test_insert_sql_placeholders() {
        let sql = insert_sql("Staging_Admissions", 2);
        assert_eq!(sql.matches('?').count(), 2 * STAGING_COLUMNS.len());
        assert!(sql.starts_with("INSERT INTO Staging_Admissions (Name, Age,"));
    }

    #[test]
    fn test_unknown_procedure() {
        let err = procedure_sql("sp_Nope", "Staging_Admissions").unwrap_err();
        assert!(matches!(err, EtlError::Merge(_)));
    }

    #[test]
    fn test_incremental_procedure_upserts_by_key() {
        let sql = procedure_sql(DEFAULT_MERGE_PROCEDURE, "Staging_Admissions").unwrap();
        assert!(sql.contains("ON CONFLICT(SourceAdmissionID) DO UPDATE"));
        assert!(sql.contains("FROM Staging_Admissions"));
    }
}
