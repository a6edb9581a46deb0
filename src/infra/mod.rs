#[cfg(feature = "db")]
pub mod libsql_warehouse;
pub mod memory;
pub mod procedures;
pub mod sqlite_warehouse;
