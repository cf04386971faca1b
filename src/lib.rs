//! seriesdb - uniform SQL driver layer for time-series archives.
//!
//! One contract over heterogeneous backends (SQLite, MySQL, PostgreSQL):
//! a closed error taxonomy, a Connection/Cursor contract every adapter
//! satisfies, and a driver registry that dispatches declarative
//! configuration to the right adapter. Callers never touch a backend module
//! directly:
//!
//! ```no_run
//! use seriesdb::{DbConfig, SqlValue};
//!
//! # async fn demo() -> seriesdb::DbResult<()> {
//! let config = DbConfig::new("sqlite", "/var/lib/weather/archive.sdb");
//! seriesdb::create_database(&config).await?;
//!
//! let mut conn = seriesdb::connect(&config).await?;
//! let mut cursor = conn.cursor()?;
//! cursor
//!     .execute(
//!         "SELECT `outTemp` FROM `archive` WHERE `dateTime` > ?",
//!         &[SqlValue::Int(1_700_000_000)],
//!     )
//!     .await?;
//! while let Some(row) = cursor.fetchone() {
//!     // one Vec<SqlValue> per archive record
//!     let _ = row;
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::DbConfig;
pub use db::{
    Connection, Cursor, Dialect, DriverRecord, DriverRegistry, RowBuffer, Transaction,
    TransactionState, connect, create_database, drop_database,
};
pub use error::{CodeMap, DbError, DbResult, ErrorKind};
pub use models::{ColumnDescriptor, Row, SchemaRows, SqlValue};
