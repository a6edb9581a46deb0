//! Loader stage: raw CSV bytes into a column-normalized table of text cells.

use crate::constants::canonical_column;
use crate::error::{EtlError, Result};
use csv::ReaderBuilder;
use serde::Serialize;
use tracing::{debug, instrument, warn};

/// Cell values the reader treats as missing, matching the default NA
/// sentinels of common dataframe CSV readers.
const NA_SENTINELS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Parsed CSV with canonical column names. Cells are `None` when empty or an
/// NA sentinel; everything else is kept verbatim for the cleaner.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub columns: Vec<&'static str>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| *c == column)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub rows_read: usize,
    pub columns: Vec<String>,
    /// Header cells that did not map to a known column
    pub ignored_columns: Vec<String>,
}

fn to_cell(raw: &str) -> Option<String> {
    if NA_SENTINELS.contains(&raw) {
        None
    } else {
        Some(raw.to_string())
    }
}

/// Parse a CSV byte stream with a header row.
///
/// Either the whole stream parses or an `EtlError::Parse` is returned; no
/// partial table escapes.
#[instrument(skip(bytes), fields(bytes = bytes.len()))]
pub fn load_csv(bytes: &[u8]) -> Result<(RawTable, LoadReport)> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| EtlError::Parse(format!("unreadable header row: {e}")))?
        .clone();
    if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
        return Err(EtlError::Parse("no header row".to_string()));
    }

    // Position in the source row for each kept column
    let mut keep: Vec<usize> = Vec::new();
    let mut table = RawTable::default();
    let mut report = LoadReport::default();

    for (idx, header) in headers.iter().enumerate() {
        match canonical_column(header) {
            Some(column) => {
                if table.columns.contains(&column) {
                    return Err(EtlError::Parse(format!(
                        "column '{column}' appears more than once in the header"
                    )));
                }
                table.columns.push(column);
                keep.push(idx);
            }
            None => {
                warn!("Ignoring unrecognized column '{}'", header);
                report.ignored_columns.push(header.to_string());
            }
        }
    }

    for (line, result) in reader.records().enumerate() {
        let record = result
            .map_err(|e| EtlError::Parse(format!("malformed data row {}: {e}", line + 1)))?;
        let row = keep
            .iter()
            .map(|&idx| record.get(idx).and_then(to_cell))
            .collect();
        table.rows.push(row);
    }

    report.rows_read = table.rows.len();
    report.columns = table.columns.iter().map(|c| c.to_string()).collect();
    debug!(
        "Loaded {} rows across {} columns",
        report.rows_read,
        table.columns.len()
    );

    Ok((table, report))
}
