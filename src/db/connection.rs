//! The connection contract every dialect adapter implements.
//!
//! Callers program only against [`Connection`]; the registry hands out
//! `Box<dyn Connection>` and never leaks an adapter type. Every method that
//! touches the native layer either succeeds or returns exactly one taxonomy
//! kind - a `sqlx` error never crosses this boundary.

use async_trait::async_trait;

use crate::db::cursor::{Cursor, RowBuffer};
use crate::db::dialect::Dialect;
use crate::error::{DbError, DbResult};
use crate::models::{SchemaRows, SqlValue};

/// Transaction state of an open connection.
///
/// `Idle` means no explicit transaction is open and statements run under the
/// backend's autocommit default; `begin` moves to `Active`, `commit` and
/// `rollback` move back to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    Active,
}

/// A live connection to one database.
///
/// A connection exclusively owns one native handle. Every operation takes
/// `&mut self` and runs to completion before returning, so operations on a
/// single connection are serialized by construction; share a connection
/// across tasks only behind external synchronization.
///
/// Lifecycle: construction opens the native connection eagerly and fails
/// with a taxonomy kind; [`close`](Connection::close) is terminal and every
/// later operation fails with [`DbError::Operational`]. Dropping an open
/// connection releases the native handle through the native client, which
/// treats an uncommitted transaction as rolled back - the hard-abort path.
#[async_trait]
pub trait Connection: Send + std::fmt::Debug {
    /// Name of the database this connection is bound to.
    fn database_name(&self) -> &str;

    /// Dialect tag of the backing adapter.
    fn dialect(&self) -> Dialect;

    /// Whether the native handle is still held.
    fn is_open(&self) -> bool;

    /// Current transaction state.
    fn transaction_state(&self) -> TransactionState;

    /// Run one neutral-SQL statement with bound parameters and buffer its
    /// result set. This is the statement runner [`Cursor`] delegates to;
    /// prefer going through a cursor.
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> DbResult<RowBuffer>;

    /// Base table names in the current database, system catalogs excluded.
    /// Stable within a call; ordering across backends is unspecified.
    async fn tables(&mut self) -> DbResult<Vec<String>>;

    /// A fresh single pass over the column descriptors of `table`, in
    /// declared column order. Fails with [`DbError::Programming`] when the
    /// table does not exist.
    async fn schema_of(&mut self, table: &str) -> DbResult<SchemaRows>;

    /// Ordered column names of `table`; equals the `name` field of
    /// [`schema_of`](Connection::schema_of) in the same order.
    async fn columns_of(&mut self, table: &str) -> DbResult<Vec<String>> {
        Ok(self.schema_of(table).await?.map(|col| col.name).collect())
    }

    /// Look up a backend configuration variable, as a `(name, value)` pair.
    /// Unknown names, and backends without such a namespace, yield `None`.
    async fn get_variable(&mut self, name: &str) -> DbResult<Option<(String, String)>>;

    /// Start an explicit transaction. Behavior of a nested `begin` is
    /// adapter-defined; any native complaint surfaces through the taxonomy.
    async fn begin(&mut self) -> DbResult<()>;

    /// Commit the open transaction. A no-op when none is open.
    async fn commit(&mut self) -> DbResult<()>;

    /// Roll back the open transaction. A no-op when none is open.
    async fn rollback(&mut self) -> DbResult<()>;

    /// Release the native handle. Idempotent; afterwards every operation on
    /// this connection fails with [`DbError::Operational`].
    async fn close(&mut self) -> DbResult<()>;
}

impl<'a> dyn Connection + 'a {
    /// Open a cursor bound to this connection.
    ///
    /// The cursor mutably borrows the connection, so the borrow checker
    /// enforces cursor validity: the connection cannot be closed, or used
    /// directly, while any of its cursors is alive.
    pub fn cursor(&mut self) -> DbResult<Cursor<'_>> {
        if !self.is_open() {
            return Err(closed_error("cursor"));
        }
        Ok(Cursor::new(self))
    }
}

/// Shared base state embedded by every adapter connection.
#[derive(Debug)]
pub(crate) struct ConnectionCore {
    pub database: String,
    pub dialect: Dialect,
    pub tx: TransactionState,
}

impl ConnectionCore {
    pub fn new(database: String, dialect: Dialect) -> Self {
        Self {
            database,
            dialect,
            tx: TransactionState::Idle,
        }
    }
}

/// The error every operation on a closed connection returns.
pub(crate) fn closed_error(operation: &str) -> DbError {
    DbError::operational(format!("{operation} on a closed connection"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_error_is_operational() {
        let err = closed_error("cursor");
        assert_eq!(err.kind(), crate::error::ErrorKind::Operational);
        assert!(err.to_string().contains("cursor"));
    }

    #[test]
    fn core_starts_idle() {
        let core = ConnectionCore::new("weather".into(), Dialect::Sqlite);
        assert_eq!(core.tx, TransactionState::Idle);
        assert_eq!(core.dialect, Dialect::Sqlite);
    }
}
