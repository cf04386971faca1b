//! Explicit transaction scope over a connection.

use crate::db::connection::Connection;
use crate::db::cursor::Cursor;
use crate::error::DbResult;

/// A transaction scope: `begin` on entry, consumed by `commit` or
/// `rollback`.
///
/// The scope mutably borrows the connection, so no statement can slip past
/// it onto the same connection while it is open. Dropping the scope without
/// finishing it leaves the native transaction to the connection's hard-abort
/// path: the backend rolls back uncommitted work when the connection goes
/// away.
pub struct Transaction<'c> {
    conn: &'c mut dyn Connection,
}

impl<'c> Transaction<'c> {
    /// Start a transaction on `conn`.
    pub async fn begin(conn: &'c mut dyn Connection) -> DbResult<Transaction<'c>> {
        conn.begin().await?;
        Ok(Self { conn })
    }

    /// Open a cursor inside the transaction.
    pub fn cursor(&mut self) -> DbResult<Cursor<'_>> {
        self.conn.cursor()
    }

    /// Commit and end the scope.
    pub async fn commit(self) -> DbResult<()> {
        self.conn.commit().await
    }

    /// Roll back and end the scope.
    pub async fn rollback(self) -> DbResult<()> {
        self.conn.rollback().await
    }
}
