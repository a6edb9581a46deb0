use crate::app::ports::{StagingSink, WarehouseMerger};
use crate::error::{EtlError, Result};
use crate::infra::procedures;
use crate::schema::{self, CellValue};
use crate::types::AdmissionRecord;
use async_trait::async_trait;
use libsql::params::Params;
use libsql::{Builder, Connection, Database, Value};
use tracing::{debug, info};

const ROWS_PER_INSERT: usize = 60;

fn to_value(cell: CellValue) -> Value {
    match cell {
        CellValue::Null => Value::Null,
        CellValue::Integer(i) => Value::Integer(i),
        CellValue::Real(f) => Value::Real(f),
        CellValue::Text(s) => Value::Text(s),
    }
}

/// Staging sink and merger backed by a remote libSQL (Turso) database.
pub struct LibsqlWarehouse {
    db: Database,
    staging_table: String,
    procedure: String,
}

impl LibsqlWarehouse {
    /// Connect to the remote database and make sure the schema exists.
    pub async fn connect(
        url: &str,
        auth_token: &str,
        staging_table: &str,
        procedure: &str,
    ) -> Result<Self> {
        procedures::validate_identifier(staging_table)?;
        procedures::validate_identifier(procedure)?;

        info!("Connecting to libSQL warehouse at {}", url);
        let db = Builder::new_remote(url.to_string(), auth_token.to_string())
            .build()
            .await
            .map_err(|e| EtlError::Config(format!("Failed to connect to database: {e}")))?;

        let warehouse = Self {
            db,
            staging_table: staging_table.to_string(),
            procedure: procedure.to_string(),
        };

        let conn = warehouse.connection()?;
        conn.execute_batch(&procedures::staging_ddl(staging_table))
            .await
            .map_err(|e| EtlError::Config(format!("Failed to create staging table: {e}")))?;
        conn.execute_batch(&procedures::fact_ddl())
            .await
            .map_err(|e| EtlError::Config(format!("Failed to create fact table: {e}")))?;

        Ok(warehouse)
    }

    fn connection(&self) -> Result<Connection> {
        self.db
            .connect()
            .map_err(|e| EtlError::Config(format!("Failed to get database connection: {e}")))
    }
}

#[async_trait]
impl StagingSink for LibsqlWarehouse {
    async fn replace(&self, destination: &str, batch: &[AdmissionRecord]) -> Result<()> {
        procedures::check_destination(destination, &self.staging_table)?;
        let sink_err = |e: libsql::Error| EtlError::Sink(e.to_string());

        let conn = self.connection().map_err(|e| EtlError::Sink(e.to_string()))?;
        let tx = conn.transaction().await.map_err(sink_err)?;
        tx.execute(&format!("DELETE FROM {destination}"), ())
            .await
            .map_err(sink_err)?;
        for chunk in batch.chunks(ROWS_PER_INSERT) {
            let values: Vec<Value> = chunk
                .iter()
                .flat_map(schema::staging_row)
                .map(to_value)
                .collect();
            tx.execute(
                &procedures::insert_sql(destination, chunk.len()),
                Params::Positional(values),
            )
            .await
            .map_err(sink_err)?;
        }
        tx.commit().await.map_err(sink_err)?;

        debug!("Replaced {} with {} rows", destination, batch.len());
        Ok(())
    }
}

#[async_trait]
impl WarehouseMerger for LibsqlWarehouse {
    async fn merge(&self) -> Result<()> {
        let sql = procedures::procedure_sql(&self.procedure, &self.staging_table)?;
        let merge_err = |e: libsql::Error| EtlError::Merge(e.to_string());

        info!("Calling procedure {}", self.procedure);
        let conn = self.connection().map_err(|e| EtlError::Merge(e.to_string()))?;
        let tx = conn.transaction().await.map_err(merge_err)?;
        tx.execute_batch(&sql).await.map_err(merge_err)?;
        tx.commit().await.map_err(merge_err)?;
        Ok(())
    }
}
