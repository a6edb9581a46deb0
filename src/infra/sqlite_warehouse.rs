use crate::app::ports::{StagingSink, WarehouseMerger};
use crate::error::{EtlError, Result};
use crate::infra::procedures;
use crate::schema::{self, CellValue};
use crate::types::AdmissionRecord;
use async_trait::async_trait;
use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};
use rusqlite::{params_from_iter, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

// Stays under SQLite's historical 999 bound-parameter limit
const ROWS_PER_INSERT: usize = 60;

impl ToSql for CellValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            CellValue::Null => ToSqlOutput::Owned(Value::Null),
            CellValue::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            CellValue::Real(f) => ToSqlOutput::Owned(Value::Real(*f)),
            CellValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

/// SQLite-backed staging table and warehouse.
///
/// One connection, opened once and shared by every run. Blocking SQLite work
/// runs on the blocking thread pool.
pub struct SqliteWarehouse {
    conn: Arc<Mutex<Connection>>,
    staging_table: String,
    procedure: String,
}

impl SqliteWarehouse {
    pub fn open<P: AsRef<Path>>(path: P, staging_table: &str, procedure: &str) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        info!("Opened warehouse database at {}", path.as_ref().display());
        Self::with_connection(conn, staging_table, procedure)
    }

    pub fn open_in_memory(staging_table: &str, procedure: &str) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, staging_table, procedure)
    }

    fn with_connection(conn: Connection, staging_table: &str, procedure: &str) -> Result<Self> {
        procedures::validate_identifier(staging_table)?;
        procedures::validate_identifier(procedure)?;

        conn.execute_batch(&procedures::staging_ddl(staging_table))?;
        conn.execute_batch(&procedures::fact_ddl())?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            staging_table: staging_table.to_string(),
            procedure: procedure.to_string(),
        })
    }

    pub fn staging_table(&self) -> &str {
        &self.staging_table
    }

    pub fn count_rows(&self, table: &str) -> Result<usize> {
        procedures::validate_identifier(table)?;
        let conn = self
            .conn
            .lock()
            .map_err(|_| EtlError::Config("warehouse connection lock poisoned".to_string()))?;
        let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get(0)
        })?;
        Ok(n as usize)
    }

    /// Business keys currently in the fact table, sorted.
    pub fn fact_keys(&self) -> Result<Vec<String>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| EtlError::Config("warehouse connection lock poisoned".to_string()))?;
        let mut stmt = conn.prepare(&format!(
            "SELECT SourceAdmissionID FROM {} ORDER BY SourceAdmissionID",
            crate::constants::FACT_TABLE
        ))?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(keys)
    }
}

fn replace_rows(
    conn: &mut Connection,
    table: &str,
    rows: &[Vec<CellValue>],
) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    tx.execute(&format!("DELETE FROM {table}"), [])?;
    for chunk in rows.chunks(ROWS_PER_INSERT) {
        let sql = procedures::insert_sql(table, chunk.len());
        tx.execute(&sql, params_from_iter(chunk.iter().flatten()))?;
    }
    tx.commit()
}

fn run_script(conn: &mut Connection, sql: &str) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(sql)?;
    tx.commit()
}

#[async_trait]
impl StagingSink for SqliteWarehouse {
    async fn replace(&self, destination: &str, batch: &[AdmissionRecord]) -> Result<()> {
        procedures::check_destination(destination, &self.staging_table)?;

        let rows: Vec<Vec<CellValue>> = batch.iter().map(schema::staging_row).collect();
        let table = destination.to_string();
        let conn = self.conn.clone();
        let n = rows.len();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = conn
                .lock()
                .map_err(|_| EtlError::Sink("connection lock poisoned".to_string()))?;
            replace_rows(&mut conn, &table, &rows).map_err(|e| EtlError::Sink(e.to_string()))
        })
        .await
        .map_err(|e| EtlError::Sink(format!("staging task failed: {e}")))??;

        debug!("Replaced {} with {} rows", destination, n);
        Ok(())
    }
}

#[async_trait]
impl WarehouseMerger for SqliteWarehouse {
    async fn merge(&self) -> Result<()> {
        let sql = procedures::procedure_sql(&self.procedure, &self.staging_table)?;
        let conn = self.conn.clone();

        info!("Calling procedure {}", self.procedure);
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = conn
                .lock()
                .map_err(|_| EtlError::Merge("connection lock poisoned".to_string()))?;
            run_script(&mut conn, &sql).map_err(|e| EtlError::Merge(e.to_string()))
        })
        .await
        .map_err(|e| EtlError::Merge(format!("merge task failed: {e}")))??;

        Ok(())
    }
}
