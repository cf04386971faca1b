//! Database driver layer.
//!
//! This module provides the backend-independent core:
//! - The `Connection` contract every adapter implements
//! - The generic `Cursor` and transaction scope
//! - Dialect tagging and neutral-SQL rewriting
//! - The driver registry and the crate's dispatch entry points
//! - One adapter per backend (sqlite, mysql, postgres)

pub mod connection;
pub mod cursor;
pub mod dialect;
pub mod mysql;
pub mod postgres;
pub mod registry;
pub mod sqlite;
pub mod transaction;
pub mod types;

pub use connection::{Connection, TransactionState};
pub use cursor::{Cursor, RowBuffer};
pub use dialect::Dialect;
pub use registry::{DriverRecord, DriverRegistry, connect, create_database, drop_database};
pub use transaction::Transaction;
