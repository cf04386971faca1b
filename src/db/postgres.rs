//! PostgreSQL dialect adapter.
//!
//! Neutral SQL is rewritten before execution: backtick identifier quoting
//! becomes double quotes and `?` placeholders become `$1..$n`. Error
//! translation keys on the SQLSTATE the server reports. Create and drop
//! connect without selecting a database (the native client then targets its
//! default) and issue `CREATE DATABASE` / `DROP DATABASE`.

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgRow};
use sqlx::{Column, ConnectOptions, Executor, Postgres, Row as _, TypeInfo};
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

type NativeConnection = sqlx::PgConnection;

/// SQLSTATE codes to taxonomy kinds.
pub(crate) const CODES: CodeMap = CodeMap::new(&[
    // Class 08 and friends: connection handling
    ("08000", ErrorKind::CannotConnect), // connection_exception
    ("08001", ErrorKind::CannotConnect), // sqlclient_unable_to_establish_sqlconnection
    ("08003", ErrorKind::CannotConnect), // connection_does_not_exist
    ("57P03", ErrorKind::CannotConnect), // cannot_connect_now
    ("08004", ErrorKind::Disconnect),    // sqlserver_rejected_establishment_of_sqlconnection
    ("08006", ErrorKind::Disconnect),    // connection_failure
    ("08P01", ErrorKind::Disconnect),    // protocol_violation
    ("57P05", ErrorKind::Disconnect),    // idle_session_timeout
    ("57P01", ErrorKind::Disconnect),    // admin_shutdown
    ("57P02", ErrorKind::Disconnect),    // crash_shutdown
    ("57P04", ErrorKind::Disconnect),    // database_dropped
    // Authentication and authorization
    ("28P01", ErrorKind::BadPassword),   // invalid_password
    ("2F002", ErrorKind::Permission),    // modifying_sql_data_not_permitted
    ("2F003", ErrorKind::Permission),    // prohibited_sql_statement_attempted
    ("2F004", ErrorKind::Permission),    // reading_sql_data_not_permitted
    ("38001", ErrorKind::Permission),    // containing_sql_not_permitted
    ("38002", ErrorKind::Permission),    // modifying_sql_data_not_permitted (external routine)
    ("38003", ErrorKind::Permission),    // prohibited_sql_statement_attempted (external routine)
    ("38004", ErrorKind::Permission),    // reading_sql_data_not_permitted (external routine)
    ("42501", ErrorKind::Permission),    // insufficient_privilege
    // Schema objects and database lifecycle
    ("3D000", ErrorKind::NoDatabase),    // invalid_catalog_name
    ("42P04", ErrorKind::DatabaseExists), // duplicate_database
    ("42P01", ErrorKind::Programming),   // undefined_table
    ("42601", ErrorKind::Programming),   // syntax_error
]);

/// The registry record for this adapter.
pub fn driver() -> DriverRecord {
    DriverRecord {
        name: "postgresql",
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
    Ok(Box::new(PgConnection::open(config).await?))
}

/// Create the configured database. SQLSTATE 42P04 guarantees
/// [`DbError::DatabaseExists`] when it is already present.
pub async fn create(config: &DbConfig) -> DbResult<()> {
    let mut conn = server_options(config).connect().await.map_err(guard_connect)?;
    let stmt = format!(
        "CREATE DATABASE {}",
        Dialect::Postgres.quote_ident(&config.database)
    );
    let result = conn.execute(stmt.as_str()).await.map_err(guard);
    conn.close().await.map_err(guard)?;
    result?;
    info!(database = %config.database, "created postgresql database");
    Ok(())
}

/// Delete the configured database. SQLSTATE 3D000 guarantees
/// [`DbError::NoDatabase`] when it is absent.
pub async fn drop_database(config: &DbConfig) -> DbResult<()> {
    let mut conn = server_options(config).connect().await.map_err(guard_connect)?;
    let stmt = format!(
        "DROP DATABASE {}",
        Dialect::Postgres.quote_ident(&config.database)
    );
    let result = conn.execute(stmt.as_str()).await.map_err(guard);
    conn.close().await.map_err(guard)?;
    result?;
    info!(database = %config.database, "dropped postgresql database");
    Ok(())
}

fn base_options(config: &DbConfig) -> PgConnectOptions {
    let mut options = PgConnectOptions::new()
        .host(config.host.as_deref().unwrap_or("localhost"))
        .port(config.port.unwrap_or(5432));
    if let Some(user) = &config.user {
        options = options.username(user);
    }
    if let Some(password) = &config.password {
        options = options.password(password);
    }
    for (key, value) in &config.options {
        match (key.as_str(), value.as_str()) {
            ("application_name", Some(name)) => options = options.application_name(name),
            _ => warn!(option = %key, "ignoring passthrough option unknown to the postgres client"),
        }
    }
    options
}

fn server_options(config: &DbConfig) -> PgConnectOptions {
    base_options(config)
}

/// A connection to one PostgreSQL database.
#[derive(Debug)]
pub struct PgConnection {
    core: ConnectionCore,
    native: Option<NativeConnection>,
}

impl PgConnection {
    /// Open the database named by `config`.
    pub async fn open(config: &DbConfig) -> DbResult<Self> {
        let options = base_options(config).database(&config.database);
        let native = options.connect().await.map_err(guard_connect)?;
        info!(database = %config.masked(), "opened postgresql connection");

        Ok(Self {
            core: ConnectionCore::new(config.database.clone(), Dialect::Postgres),
            native: Some(native),
        })
    }

    fn native_mut(&mut self, operation: &str) -> DbResult<&mut NativeConnection> {
        self.native.as_mut().ok_or_else(|| closed_error(operation))
    }
}

#[async_trait]
impl Connection for PgConnection {
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
                "SELECT relname FROM pg_class \
                 WHERE relkind = 'r' AND relname !~ '^(pg_|sql_)'",
            )
            .await
            .map_err(guard)?;
        rows.iter()
            .map(|row| row.try_get::<String, _>(0).map_err(guard))
            .collect()
    }

    async fn schema_of(&mut self, table: &str) -> DbResult<SchemaRows> {
        let native = self.native_mut("schema_of")?;
        let rows = sqlx::query(
            "SELECT c.column_name, c.data_type, c.is_nullable, c.column_default, \
                    CASE WHEN pk.column_name IS NOT NULL THEN true ELSE false END AS is_primary_key \
             FROM information_schema.columns c \
             LEFT JOIN ( \
                 SELECT kcu.column_name \
                 FROM information_schema.table_constraints tc \
                 JOIN information_schema.key_column_usage kcu \
                     ON tc.constraint_name = kcu.constraint_name \
                     AND tc.table_schema = kcu.table_schema \
                 WHERE tc.table_name = $1 AND tc.constraint_type = 'PRIMARY KEY' \
             ) pk ON c.column_name = pk.column_name \
             WHERE c.table_name = $1 \
             ORDER BY c.ordinal_position",
        )
        .bind(table)
        .fetch_all(&mut *native)
        .await
        .map_err(guard)?;
        if rows.is_empty() {
            return Err(DbError::programming(format!("table {table} does not exist")));
        }

        let mut raw = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row.try_get("column_name").map_err(guard)?;
            let declared: String = row.try_get("data_type").map_err(guard)?;
            let is_nullable: String = row.try_get("is_nullable").map_err(guard)?;
            let default: Option<String> = row.try_get("column_default").map_err(guard)?;
            let is_primary: bool = row.try_get("is_primary_key").map_err(guard)?;
            raw.push((name, declared, is_nullable, default, is_primary));
        }

        Ok(SchemaRows::new(raw.into_iter().enumerate().map(
            |(ordinal, (name, declared, is_nullable, default, is_primary))| {
                descriptor(ordinal, name, &declared, &is_nullable, default, is_primary)
            },
        )))
    }

    async fn get_variable(&mut self, name: &str) -> DbResult<Option<(String, String)>> {
        let native = self.native_mut("get_variable")?;
        let rows = sqlx::query("SELECT name, setting FROM pg_settings WHERE name = $1")
            .bind(name)
            .fetch_all(&mut *native)
            .await
            .map_err(guard)?;
        match rows.first() {
            Some(row) => {
                let name: String = row.try_get(0).map_err(guard)?;
                let setting: String = row.try_get(1).map_err(guard)?;
                Ok(Some((name, setting)))
            }
            None => Ok(None),
        }
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
            debug!(database = %self.core.database, "closed postgresql connection");
        }
        self.core.tx = TransactionState::Idle;
        Ok(())
    }
}

/// Translate a native error through the SQLSTATE table.
fn guard(err: sqlx::Error) -> DbError {
    CODES.translate(err)
}

fn guard_connect(err: sqlx::Error) -> DbError {
    CODES.translate_connect(err)
}

/// Canonicalize one `information_schema.columns` row: nullability arrives as
/// `'YES'/'NO'` text; the primary-key flag is computed by the catalog join.
fn descriptor(
    ordinal: usize,
    name: String,
    declared: &str,
    is_nullable: &str,
    default: Option<String>,
    is_primary: bool,
) -> ColumnDescriptor {
    ColumnDescriptor {
        ordinal,
        name,
        declared_type: declared.to_uppercase(),
        nullable: is_nullable.eq_ignore_ascii_case("YES") && !is_primary,
        default_value: default,
        is_primary,
    }
}

fn bind_param<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    param: &'q SqlValue,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match param {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.as_str()),
        SqlValue::Bytes(v) => query.bind(v.as_slice()),
    }
}

fn decode_row(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| decode_column(row, idx, col.type_info().name()))
        .collect()
}

fn decode_column(row: &PgRow, idx: usize, type_name: &str) -> SqlValue {
    match categorize_type(type_name) {
        TypeCategory::Boolean => row
            .try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Bool)
            .unwrap_or(SqlValue::Null),
        TypeCategory::Integer => {
            // INT2/INT4/INT8 each decode only at their own width.
            if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
                return SqlValue::Int(v as i64);
            }
            if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
                return SqlValue::Int(v as i64);
            }
            if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
                return SqlValue::Int(v);
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
