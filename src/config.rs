use crate::constants::{DEFAULT_MERGE_PROCEDURE, DEFAULT_STAGING_TABLE};
use crate::error::{EtlError, Result};
use crate::infra::procedures::validate_identifier;
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_PATH: &str = "etl.toml";

/// Runtime settings. Every field has a default; a TOML file and then
/// environment variables override them in that order.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
    pub database_path: PathBuf,
    pub staging_table: String,
    pub merge_procedure: String,
    pub log_dir: String,
    pub bind_addr: String,
    pub libsql_url: Option<String>,
    pub libsql_auth_token: Option<String>,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("warehouse.db"),
            staging_table: DEFAULT_STAGING_TABLE.to_string(),
            merge_procedure: DEFAULT_MERGE_PROCEDURE.to_string(),
            log_dir: "logs".to_string(),
            bind_addr: "127.0.0.1:8501".to_string(),
            libsql_url: None,
            libsql_auth_token: None,
        }
    }
}

impl EtlConfig {
    /// Load from `path` if given (must exist), else from `etl.toml` if
    /// present, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let content = fs::read_to_string(p).map_err(|e| {
                    EtlError::Config(format!(
                        "Failed to read config file '{}': {}",
                        p.display(),
                        e
                    ))
                })?;
                Self::from_toml_str(&content)?
            }
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_toml_str(&fs::read_to_string(DEFAULT_CONFIG_PATH)?)?
            }
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `ETL_*` / `LIBSQL_*` overrides from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("ETL_DATABASE_PATH") {
            self.database_path = PathBuf::from(v);
        }
        if let Some(v) = get("ETL_STAGING_TABLE") {
            self.staging_table = v;
        }
        if let Some(v) = get("ETL_MERGE_PROCEDURE") {
            self.merge_procedure = v;
        }
        if let Some(v) = get("ETL_LOG_DIR") {
            self.log_dir = v;
        }
        if let Some(v) = get("ETL_BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Some(v) = get("LIBSQL_URL") {
            self.libsql_url = Some(v);
        }
        if let Some(v) = get("LIBSQL_AUTH_TOKEN") {
            self.libsql_auth_token = Some(v);
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.staging_table)?;
        validate_identifier(&self.merge_procedure)?;
        self.socket_addr()?;
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.bind_addr
            .parse()
            .map_err(|e| EtlError::Config(format!("Invalid bind address '{}': {}", self.bind_addr, e)))
    }
}
