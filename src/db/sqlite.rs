//! SQLite dialect adapter.
//!
//! The database name in the configuration is the archive file path (or
//! `:memory:`). Create and drop are filesystem operations, which is also
//! what guarantees `DatabaseExists`/`NoDatabase` on this backend. The
//! neutral SQL convention (backticks, `?`) is native here, so statements
//! pass through unrewritten.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqliteRow};
use sqlx::{Column, ConnectOptions, Executor, Row as _, Sqlite, TypeInfo};
use sqlx::Connection as _;
use tracing::{debug, info, warn};

use crate::config::DbConfig;
use crate::db::connection::{closed_error, Connection, ConnectionCore, TransactionState};
use crate::db::cursor::RowBuffer;
use crate::db::dialect::Dialect;
use crate::db::registry::{AdminFuture, ConnectFuture, DriverRecord};
use crate::db::types::{categorize_type, TypeCategory};
use crate::error::{CodeMap, DbError, DbResult, ErrorKind};
use crate::models::{ColumnDescriptor, Row, SchemaRows, SqlValue};

type NativeConnection = sqlx::sqlite::SqliteConnection;

/// Primary SQLite result codes to taxonomy kinds. Extended codes are masked
/// to their primary code before lookup, see [`primary_code`].
pub(crate) const CODES: CodeMap = CodeMap::new(&[
    ("1", ErrorKind::Programming),   // SQLITE_ERROR: bad SQL, missing object
    ("5", ErrorKind::Operational),   // SQLITE_BUSY
    ("6", ErrorKind::Operational),   // SQLITE_LOCKED
    ("8", ErrorKind::Permission),    // SQLITE_READONLY
    ("14", ErrorKind::CannotConnect), // SQLITE_CANTOPEN
    ("23", ErrorKind::Permission),   // SQLITE_AUTH
]);

/// The registry record for this adapter.
pub fn driver() -> DriverRecord {
    DriverRecord {
        name: "sqlite",
        connect: connect_boxed,
        create: create_boxed,
        drop: drop_boxed,
    }
}

fn connect_boxed(config: &DbConfig) -> ConnectFuture<'_> {
    Box::pin(connect(config))
}

fn create_boxed(config: &DbConfig) -> AdminFuture<'_> {
    Box::pin(create(config))
}

fn drop_boxed(config: &DbConfig) -> AdminFuture<'_> {
    Box::pin(drop_database(config))
}

/// Open a connection to an existing archive file.
pub async fn connect(config: &DbConfig) -> DbResult<Box<dyn Connection>> {
    Ok(Box::new(SqliteConnection::open(config).await?))
}

/// Create the archive file. Fails with [`DbError::DatabaseExists`] when the
/// file is already present.
pub async fn create(config: &DbConfig) -> DbResult<()> {
    let path = &config.database;
    if path == ":memory:" {
        return Ok(());
    }
    if Path::new(path).exists() {
        return Err(DbError::database_exists(path.clone()));
    }
    if let Some(parent) = Path::new(path).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|e| DbError::operational(format!("cannot create {}: {e}", parent.display())))?;
    }
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let conn = options.connect().await.map_err(guard_connect)?;
    conn.close().await.map_err(guard)?;
    info!(database = %path, "created sqlite database");
    Ok(())
}

/// Remove the archive file. Fails with [`DbError::NoDatabase`] when it does
/// not exist.
pub async fn drop_database(config: &DbConfig) -> DbResult<()> {
    let path = &config.database;
    if path == ":memory:" || !Path::new(path).exists() {
        return Err(DbError::no_database(path.clone()));
    }
    std::fs::remove_file(path)
        .map_err(|e| DbError::operational(format!("cannot remove {path}: {e}")))?;
    info!(database = %path, "dropped sqlite database");
    Ok(())
}

/// A connection to one SQLite archive file.
#[derive(Debug)]
pub struct SqliteConnection {
    core: ConnectionCore,
    native: Option<NativeConnection>,
}

impl SqliteConnection {
    /// Open the archive at `config.database`. Fails with
    /// [`DbError::NoDatabase`] when the file does not exist; use `create`
    /// first.
    pub async fn open(config: &DbConfig) -> DbResult<Self> {
        let path = &config.database;
        let options = if path == ":memory:" {
            SqliteConnectOptions::from_str(":memory:").map_err(guard_connect)?
        } else {
            if !Path::new(path).exists() {
                return Err(DbError::no_database(path.clone()));
            }
            SqliteConnectOptions::new().filename(path)
        };

        let mut native = options.connect().await.map_err(guard_connect)?;
        apply_pragmas(&mut native, config).await?;
        info!(database = %config.masked(), "opened sqlite connection");

        Ok(Self {
            core: ConnectionCore::new(config.database.clone(), Dialect::Sqlite),
            native: Some(native),
        })
    }

    fn native_mut(&mut self, operation: &str) -> DbResult<&mut NativeConnection> {
        self.native.as_mut().ok_or_else(|| closed_error(operation))
    }
}

/// Forward passthrough options as pragmas, the configuration channel sqlite
/// natively offers.
async fn apply_pragmas(native: &mut NativeConnection, config: &DbConfig) -> DbResult<()> {
    for (key, value) in &config.options {
        if !is_identifier(key) {
            warn!(option = %key, "skipping passthrough option with non-pragma name");
            continue;
        }
        let Some(rendered) = render_pragma_value(value) else {
            warn!(option = %key, "skipping passthrough option with unsupported value");
            continue;
        };
        let stmt = format!("PRAGMA {key} = {rendered}");
        debug!(pragma = %stmt, "applying connection option");
        (&mut *native).execute(stmt.as_str()).await.map_err(guard)?;
    }
    Ok(())
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn render_pragma_value(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        _ => None,
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    fn database_name(&self) -> &str {
        &self.core.database
    }

    fn dialect(&self) -> Dialect {
        self.core.dialect
    }

    fn is_open(&self) -> bool {
        self.native.is_some()
    }

    fn transaction_state(&self) -> TransactionState {
        self.core.tx
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> DbResult<RowBuffer> {
        let sql = self.core.dialect.rewrite(sql);
        let native = self.native_mut("execute")?;
        debug!(sql = %sql, params = params.len(), "executing statement");

        let rows = if params.is_empty() {
            native.fetch_all(sql.as_str()).await.map_err(guard)?
        } else {
            let mut query = sqlx::query(&sql);
            for param in params {
                query = bind_param(query, param);
            }
            query.fetch_all(&mut *native).await.map_err(guard)?
        };

        Ok(RowBuffer::from_rows(rows.iter().map(decode_row).collect()))
    }

    async fn tables(&mut self) -> DbResult<Vec<String>> {
        let native = self.native_mut("tables")?;
        let rows = native
            .fetch_all(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )
            .await
            .map_err(guard)?;
        rows.iter()
            .map(|row| row.try_get::<String, _>(0).map_err(guard))
            .collect()
    }

    async fn schema_of(&mut self, table: &str) -> DbResult<SchemaRows> {
        let sql = format!("PRAGMA table_info({})", self.core.dialect.quote_ident(table));
        let native = self.native_mut("schema_of")?;
        let rows = native.fetch_all(sql.as_str()).await.map_err(guard)?;
        if rows.is_empty() {
            return Err(DbError::programming(format!("table {table} does not exist")));
        }

        let mut raw = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row.try_get("name").map_err(guard)?;
            let declared: String = row.try_get("type").map_err(guard)?;
            let notnull: i64 = row.try_get("notnull").map_err(guard)?;
            let default: Option<String> = row.try_get("dflt_value").map_err(guard)?;
            let pk: i64 = row.try_get("pk").map_err(guard)?;
            raw.push((name, declared, notnull, default, pk));
        }

        Ok(SchemaRows::new(raw.into_iter().enumerate().map(
            |(ordinal, (name, declared, notnull, default, pk))| {
                descriptor(ordinal, name, &declared, notnull, default, pk)
            },
        )))
    }

    async fn get_variable(&mut self, name: &str) -> DbResult<Option<(String, String)>> {
        if !is_identifier(name) {
            return Ok(None);
        }
        let sql = format!("PRAGMA {name}");
        let native = self.native_mut("get_variable")?;
        // An unknown pragma yields no rows rather than an error.
        let rows = native.fetch_all(sql.as_str()).await.map_err(guard)?;
        let Some(row) = rows.first() else {
            return Ok(None);
        };
        Ok(scalar_text(row).map(|value| (name.to_string(), value)))
    }

    async fn begin(&mut self) -> DbResult<()> {
        let native = self.native_mut("begin")?;
        native.execute("BEGIN").await.map_err(guard)?;
        self.core.tx = TransactionState::Active;
        Ok(())
    }

    async fn commit(&mut self) -> DbResult<()> {
        if self.core.tx != TransactionState::Active {
            return Ok(());
        }
        let native = self.native_mut("commit")?;
        native.execute("COMMIT").await.map_err(guard)?;
        self.core.tx = TransactionState::Idle;
        Ok(())
    }

    async fn rollback(&mut self) -> DbResult<()> {
        if self.core.tx != TransactionState::Active {
            return Ok(());
        }
        let native = self.native_mut("rollback")?;
        native.execute("ROLLBACK").await.map_err(guard)?;
        self.core.tx = TransactionState::Idle;
        Ok(())
    }

    async fn close(&mut self) -> DbResult<()> {
        if let Some(native) = self.native.take() {
            native.close().await.map_err(guard)?;
            debug!(database = %self.core.database, "closed sqlite connection");
        }
        self.core.tx = TransactionState::Idle;
        Ok(())
    }
}

/// Translate a native error through the code table, masking extended result
/// codes to their primary code first.
fn guard(err: sqlx::Error) -> DbError {
    match err {
        sqlx::Error::Database(native) => {
            let code = native.code().and_then(|c| primary_code(&c));
            CODES
                .kind_for(code.as_deref())
                .with_message(native.message().to_string())
        }
        other => CODES.translate(other),
    }
}

fn guard_connect(err: sqlx::Error) -> DbError {
    match err {
        sqlx::Error::Database(_) => guard(err),
        other => CODES.translate_connect(other),
    }
}

/// Mask an extended result code (e.g. `1555`) down to its primary code.
fn primary_code(code: &str) -> Option<String> {
    code.parse::<u32>().ok().map(|c| (c & 0xff).to_string())
}

/// Canonicalize one `PRAGMA table_info` row. `notnull` and `pk` are 0/1
/// integers; primary-key columns are reported non-nullable regardless of
/// `notnull`, so descriptors agree across backends.
fn descriptor(
    ordinal: usize,
    name: String,
    declared: &str,
    notnull: i64,
    default: Option<String>,
    pk: i64,
) -> ColumnDescriptor {
    let is_primary = pk > 0;
    ColumnDescriptor {
        ordinal,
        name,
        declared_type: declared.to_uppercase(),
        nullable: notnull == 0 && !is_primary,
        default_value: default,
        is_primary,
    }
}

fn bind_param<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    param: &'q SqlValue,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match param {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.as_str()),
        SqlValue::Bytes(v) => query.bind(v.as_slice()),
    }
}

fn decode_row(row: &SqliteRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| decode_column(row, idx, col.type_info().name()))
        .collect()
}

fn decode_column(row: &SqliteRow, idx: usize, type_name: &str) -> SqlValue {
    match categorize_type(type_name) {
        TypeCategory::Boolean => row
            .try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Bool)
            .unwrap_or(SqlValue::Null),
        TypeCategory::Integer => row
            .try_get::<Option<i64>, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Int)
            .unwrap_or(SqlValue::Null),
        TypeCategory::Float => row
            .try_get::<Option<f64>, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Float)
            .unwrap_or(SqlValue::Null),
        TypeCategory::Binary => row
            .try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Bytes)
            .unwrap_or(SqlValue::Null),
        TypeCategory::Text => row
            .try_get::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Text)
            .unwrap_or(SqlValue::Null),
        // Expression columns carry no declared type; probe by storage class.
        TypeCategory::Unknown => {
            if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
                return SqlValue::Int(v);
            }
            if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
                return SqlValue::Float(v);
            }
            if let Ok(Some(v)) = row.try_get::<Option<String>, _>(idx) {
                return SqlValue::Text(v);
            }
            if let Ok(Some(v)) = row.try_get::<Option<Vec<u8>>, _>(idx) {
                return SqlValue::Bytes(v);
            }
            SqlValue::Null
        }
    }
}

/// First column of a pragma row rendered as text, whatever its native type.
fn scalar_text(row: &SqliteRow) -> Option<String> {
    if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(0) {
        return Some(v.to_string());
    }
    if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(0) {
        return Some(v.to_string());
    }
    row.try_get::<Option<String>, _>(0).ok().flatten()
}
