//! MySQL/MariaDB dialect adapter.
//!
//! The neutral SQL convention (backticks, `?`) is native here. Error
//! translation keys on the native error number (not the SQLSTATE), which is
//! what disambiguates e.g. bad credentials (1045) from a missing database
//! (1049). Create and drop run over a server-level connection with no
//! database selected.

use async_trait::async_trait;
use sqlx::mysql::{MySqlArguments, MySqlConnectOptions, MySqlRow};
use sqlx::{Column, ConnectOptions, Executor, MySql, Row as _, TypeInfo};
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

type NativeConnection = sqlx::MySqlConnection;

/// Native MySQL error numbers to taxonomy kinds.
pub(crate) const CODES: CodeMap = CodeMap::new(&[
    ("1007", ErrorKind::DatabaseExists), // can't create database; exists
    ("1008", ErrorKind::NoDatabase),     // can't drop database; doesn't exist
    ("1044", ErrorKind::Permission),     // access denied for user to database
    ("1045", ErrorKind::BadPassword),    // access denied (using password)
    ("1049", ErrorKind::NoDatabase),     // unknown database
    ("1064", ErrorKind::Programming),    // syntax error
    ("1142", ErrorKind::Permission),     // command denied to user
    ("1146", ErrorKind::Programming),    // table doesn't exist
    ("2002", ErrorKind::CannotConnect),  // can't connect through socket
    ("2003", ErrorKind::CannotConnect),  // can't connect to server
    ("2005", ErrorKind::CannotConnect),  // unknown server host
    ("2006", ErrorKind::Disconnect),     // server has gone away
    ("2013", ErrorKind::Disconnect),     // lost connection during query
]);

/// The registry record for this adapter.
pub fn driver() -> DriverRecord {
    DriverRecord {
        name: "mysql",
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

/// Open a connection to the configured database.
pub async fn connect(config: &DbConfig) -> DbResult<Box<dyn Connection>> {
    Ok(Box::new(MySqlConnection::open(config).await?))
}

/// Create the configured database. Native error 1007 guarantees
/// [`DbError::DatabaseExists`] when it is already present.
pub async fn create(config: &DbConfig) -> DbResult<()> {
    let mut conn = server_options(config).connect().await.map_err(guard_connect)?;
    let stmt = format!(
        "CREATE DATABASE {}",
        Dialect::MySql.quote_ident(&config.database)
    );
    let result = conn.execute(stmt.as_str()).await.map_err(guard);
    conn.close().await.map_err(guard)?;
    result?;
    info!(database = %config.database, "created mysql database");
    Ok(())
}

/// Delete the configured database. Native errors 1008/1049 guarantee
/// [`DbError::NoDatabase`] when it is absent.
pub async fn drop_database(config: &DbConfig) -> DbResult<()> {
    let mut conn = server_options(config).connect().await.map_err(guard_connect)?;
    let stmt = format!(
        "DROP DATABASE {}",
        Dialect::MySql.quote_ident(&config.database)
    );
    let result = conn.execute(stmt.as_str()).await.map_err(guard);
    conn.close().await.map_err(guard)?;
    result?;
    info!(database = %config.database, "dropped mysql database");
    Ok(())
}

fn base_options(config: &DbConfig) -> MySqlConnectOptions {
    let mut options = MySqlConnectOptions::new()
        .host(config.host.as_deref().unwrap_or("localhost"))
        .port(config.port.unwrap_or(3306));
    if let Some(user) = &config.user {
        options = options.username(user);
    }
    if let Some(password) = &config.password {
        options = options.password(password);
    }
    for (key, value) in &config.options {
        match (key.as_str(), value.as_str()) {
            ("charset", Some(charset)) => options = options.charset(charset),
            _ => warn!(option = %key, "ignoring passthrough option unknown to the mysql client"),
        }
    }
    options
}

fn server_options(config: &DbConfig) -> MySqlConnectOptions {
    base_options(config)
}

/// A connection to one MySQL database.
#[derive(Debug)]
pub struct MySqlConnection {
    core: ConnectionCore,
    native: Option<NativeConnection>,
}

impl MySqlConnection {
    /// Open the database named by `config`.
    pub async fn open(config: &DbConfig) -> DbResult<Self> {
        let options = base_options(config).database(&config.database);
        let native = options.connect().await.map_err(guard_connect)?;
        info!(database = %config.masked(), "opened mysql connection");

        Ok(Self {
            core: ConnectionCore::new(config.database.clone(), Dialect::MySql),
            native: Some(native),
        })
    }

    fn native_mut(&mut self, operation: &str) -> DbResult<&mut NativeConnection> {
        self.native.as_mut().ok_or_else(|| closed_error(operation))
    }
}

#[async_trait]
impl Connection for MySqlConnection {
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
                "SELECT TABLE_NAME FROM information_schema.TABLES \
                 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE' \
                 ORDER BY TABLE_NAME",
            )
            .await
            .map_err(guard)?;
        Ok(rows.iter().map(|row| get_string(row, 0)).collect())
    }

    async fn schema_of(&mut self, table: &str) -> DbResult<SchemaRows> {
        let native = self.native_mut("schema_of")?;
        let rows = sqlx::query(
            "SELECT COLUMN_NAME, COLUMN_TYPE, IS_NULLABLE, COLUMN_DEFAULT, COLUMN_KEY \
             FROM information_schema.COLUMNS \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? \
             ORDER BY ORDINAL_POSITION",
        )
        .bind(table)
        .fetch_all(&mut *native)
        .await
        .map_err(guard)?;
        if rows.is_empty() {
            return Err(DbError::programming(format!("table {table} does not exist")));
        }

        let raw: Vec<(String, String, String, Option<String>, String)> = rows
            .iter()
            .map(|row| {
                (
                    get_string(row, 0),
                    get_string(row, 1),
                    get_string(row, 2),
                    row.try_get::<Option<String>, _>(3).ok().flatten(),
                    get_string(row, 4),
                )
            })
            .collect();

        Ok(SchemaRows::new(raw.into_iter().enumerate().map(
            |(ordinal, (name, declared, is_nullable, default, column_key))| {
                descriptor(ordinal, name, &declared, &is_nullable, default, &column_key)
            },
        )))
    }

    async fn get_variable(&mut self, name: &str) -> DbResult<Option<(String, String)>> {
        let native = self.native_mut("get_variable")?;
        let sql = format!("SHOW VARIABLES LIKE '{}'", escape_literal(name));
        let rows = native.fetch_all(sql.as_str()).await.map_err(guard)?;
        Ok(rows
            .first()
            .map(|row| (get_string(row, 0), get_string(row, 1))))
    }

    async fn begin(&mut self) -> DbResult<()> {
        let native = self.native_mut("begin")?;
        native.execute("START TRANSACTION").await.map_err(guard)?;
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
            debug!(database = %self.core.database, "closed mysql connection");
        }
        self.core.tx = TransactionState::Idle;
        Ok(())
    }
}

/// Translate a native error through the code table, keyed on the native
/// error number rather than the SQLSTATE.
fn guard(err: sqlx::Error) -> DbError {
    match err {
        sqlx::Error::Database(native) => {
            let code = native
                .try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>()
                .map(|e| e.number().to_string());
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

/// Canonicalize one `information_schema.COLUMNS` row: the catalog reports
/// nullability as `'YES'/'NO'` text and the primary key as `COLUMN_KEY =
/// 'PRI'`.
fn descriptor(
    ordinal: usize,
    name: String,
    declared: &str,
    is_nullable: &str,
    default: Option<String>,
    column_key: &str,
) -> ColumnDescriptor {
    ColumnDescriptor {
        ordinal,
        name,
        declared_type: declared.to_uppercase(),
        nullable: is_nullable.eq_ignore_ascii_case("YES"),
        default_value: default,
        is_primary: column_key.eq_ignore_ascii_case("PRI"),
    }
}

/// Escape a string for inclusion in a single-quoted MySQL literal.
fn escape_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "''")
}

/// Read a textual column that the server may report as VARCHAR or, under
/// some charset configurations, VARBINARY.
fn get_string(row: &MySqlRow, idx: usize) -> String {
    row.try_get::<String, _>(idx)
        .ok()
        .or_else(|| {
            row.try_get::<Vec<u8>, _>(idx)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
        })
        .unwrap_or_default()
}

fn bind_param<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    param: &'q SqlValue,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match param {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.as_str()),
        SqlValue::Bytes(v) => query.bind(v.as_slice()),
    }
}

fn decode_row(row: &MySqlRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| decode_column(row, idx, col.type_info().name()))
        .collect()
}

fn decode_column(row: &MySqlRow, idx: usize, type_name: &str) -> SqlValue {
    match categorize_type(type_name) {
        TypeCategory::Boolean => row
            .try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Bool)
            .unwrap_or(SqlValue::Null),
        TypeCategory::Integer => {
            if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
                return SqlValue::Int(v);
            }
            // BIGINT UNSIGNED columns decode only as u64.
            if let Ok(Some(v)) = row.try_get::<Option<u64>, _>(idx) {
                return SqlValue::Int(v as i64);
            }
            SqlValue::Null
        }
        TypeCategory::Float => {
            if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
                return SqlValue::Float(v);
            }
            if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
                return SqlValue::Float(v as f64);
            }
            SqlValue::Null
        }
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
        TypeCategory::Unknown => {
            if let Ok(Some(v)) = row.try_get::<Option<String>, _>(idx) {
                return SqlValue::Text(v);
            }
            if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
                return SqlValue::Int(v);
            }
            if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
                return SqlValue::Float(v);
            }
            if let Ok(Some(v)) = row.try_get::<Option<Vec<u8>>, _>(idx) {
                return SqlValue::Bytes(v);
            }
            SqlValue::Null
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_numbers_map_to_their_kinds() {
        assert_eq!(CODES.kind_for(Some("1007")), ErrorKind::DatabaseExists);
        assert_eq!(CODES.kind_for(Some("1045")), ErrorKind::BadPassword);
        assert_eq!(CODES.kind_for(Some("1049")), ErrorKind::NoDatabase);
        assert_eq!(CODES.kind_for(Some("1146")), ErrorKind::Programming);
        assert_eq!(CODES.kind_for(Some("2006")), ErrorKind::Disconnect);
        assert_eq!(CODES.kind_for(Some("1062")), ErrorKind::Database);
    }

    #[test]
    fn catalog_sentinels_canonicalize() {
        let id = descriptor(0, "id".into(), "int(11)", "NO", None, "PRI");
        assert!(id.is_primary);
        assert!(!id.nullable);
        assert_eq!(id.declared_type, "INT(11)");

        let name = descriptor(1, "name".into(), "varchar(30)", "YES", None, "");
        assert!(!name.is_primary);
        assert!(name.nullable);
    }

    #[test]
    fn literal_escaping() {
        assert_eq!(escape_literal("max_connections"), "max_connections");
        assert_eq!(escape_literal("it's"), "it''s");
        assert_eq!(escape_literal("a\\b"), "a\\\\b");
    }
}
