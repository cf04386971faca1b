//! Generic cursor over any adapter connection.
//!
//! The two cursor capabilities are separate pieces: [`RowBuffer`] is the
//! result-stream capability (row-by-row production), [`Cursor`] is the
//! closable handle that runs statements and drains the buffer. Adapters
//! never implement cursors; they only produce row buffers.

use std::collections::VecDeque;

use crate::db::connection::Connection;
use crate::error::{DbError, DbResult};
use crate::models::{Row, SqlValue};

/// Buffered result set of one statement, drained single-pass.
#[derive(Debug, Default)]
pub struct RowBuffer {
    rows: VecDeque<Row>,
}

impl RowBuffer {
    /// Build a buffer from decoded rows.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self { rows: rows.into() }
    }

    /// Produce the next row, consuming it.
    pub fn next_row(&mut self) -> Option<Row> {
        self.rows.pop_front()
    }

    /// Rows not yet consumed.
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

/// A cursor bound to its parent connection for its whole lifetime.
///
/// Obtained from `Connection::cursor()`. `execute` runs a statement and
/// replaces the buffered result set; rows are then consumed one at a time
/// through [`fetchone`](Cursor::fetchone) or iteration. Exhaustion is a
/// normal end-of-sequence, not an error. Dropping the cursor releases its
/// buffer; an explicit [`close`](Cursor::close) does the same eagerly.
pub struct Cursor<'c> {
    conn: &'c mut dyn Connection,
    rows: RowBuffer,
    open: bool,
}

impl<'c> Cursor<'c> {
    pub(crate) fn new(conn: &'c mut dyn Connection) -> Self {
        Self {
            conn,
            rows: RowBuffer::default(),
            open: true,
        }
    }

    /// Execute a neutral-SQL statement with `params` bound to its `?`
    /// placeholders. Returns the cursor itself so the result can be
    /// iterated directly.
    pub async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> DbResult<&mut Self> {
        if !self.open {
            return Err(DbError::operational("execute on a closed cursor"));
        }
        self.rows = self.conn.execute(sql, params).await?;
        Ok(self)
    }

    /// The next result row, or `None` once the set is exhausted.
    pub fn fetchone(&mut self) -> Option<Row> {
        if !self.open {
            return None;
        }
        self.rows.next_row()
    }

    /// Drop the buffered result set. Further `execute` calls fail with
    /// [`DbError::Operational`]; further fetches yield `None`.
    pub fn close(&mut self) {
        self.open = false;
        self.rows = RowBuffer::default();
    }
}

impl Iterator for Cursor<'_> {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        self.fetchone()
    }
}

impl std::fmt::Debug for Cursor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("open", &self.open)
            .field("buffered", &self.rows.remaining())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SqlValue;

    #[test]
    fn row_buffer_is_single_pass() {
        let mut buffer = RowBuffer::from_rows(vec![
            vec![SqlValue::Int(1)],
            vec![SqlValue::Int(2)],
        ]);
        assert_eq!(buffer.remaining(), 2);
        assert_eq!(buffer.next_row(), Some(vec![SqlValue::Int(1)]));
        assert_eq!(buffer.next_row(), Some(vec![SqlValue::Int(2)]));
        assert_eq!(buffer.next_row(), None);
        assert_eq!(buffer.next_row(), None);
    }
}
