use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Failed to parse input: {0}")]
    Parse(String),

    #[error("Required column missing: {0}")]
    MissingColumn(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Batch violates staging schema: {0}")]
    Schema(String),

    #[error("Staging load failed: {0}")]
    Sink(String),

    #[error("Warehouse merge failed: {0}")]
    Merge(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, EtlError>;
