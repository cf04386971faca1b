//! Error taxonomy for the driver layer.
//!
//! Every failure that crosses the crate boundary is one of the closed set of
//! kinds below, carrying the native backend message as diagnostic content.
//! Adapters own a [`CodeMap`] from native error codes to kinds; translation
//! through [`CodeMap::translate`] is the only path a `sqlx` error takes out
//! of an adapter.

use thiserror::Error;

/// Backend-independent database error.
///
/// `Database` is the root kind: any native code absent from an adapter's
/// mapping table resolves to it, so translation is total by construction.
#[derive(Error, Debug)]
pub enum DbError {
    /// Catch-all for native errors with no more specific mapping.
    #[error("database error: {0}")]
    Database(String),

    /// Runtime failure on a valid request, e.g. use of a closed connection.
    #[error("operational error: {0}")]
    Operational(String),

    /// Invalid SQL or a missing schema object.
    #[error("programming error: {0}")]
    Programming(String),

    /// The initial connection attempt failed.
    #[error("cannot connect: {0}")]
    CannotConnect(String),

    /// An established connection was lost mid-session.
    #[error("connection lost: {0}")]
    Disconnect(String),

    /// Authentication rejected.
    #[error("bad password: {0}")]
    BadPassword(String),

    /// Authenticated but not authorized for the operation.
    #[error("permission denied: {0}")]
    Permission(String),

    /// The database to be created already exists.
    #[error("database already exists: {0}")]
    DatabaseExists(String),

    /// The named database does not exist.
    #[error("no such database: {0}")]
    NoDatabase(String),
}

impl DbError {
    /// Create an operational error.
    pub fn operational(message: impl Into<String>) -> Self {
        Self::Operational(message.into())
    }

    /// Create a programming error.
    pub fn programming(message: impl Into<String>) -> Self {
        Self::Programming(message.into())
    }

    /// Create a cannot-connect error.
    pub fn cannot_connect(message: impl Into<String>) -> Self {
        Self::CannotConnect(message.into())
    }

    /// Create a database-exists error.
    pub fn database_exists(message: impl Into<String>) -> Self {
        Self::DatabaseExists(message.into())
    }

    /// Create a no-database error.
    pub fn no_database(message: impl Into<String>) -> Self {
        Self::NoDatabase(message.into())
    }

    /// The kind of this error, for category matching without string
    /// inspection.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Database(_) => ErrorKind::Database,
            Self::Operational(_) => ErrorKind::Operational,
            Self::Programming(_) => ErrorKind::Programming,
            Self::CannotConnect(_) => ErrorKind::CannotConnect,
            Self::Disconnect(_) => ErrorKind::Disconnect,
            Self::BadPassword(_) => ErrorKind::BadPassword,
            Self::Permission(_) => ErrorKind::Permission,
            Self::DatabaseExists(_) => ErrorKind::DatabaseExists,
            Self::NoDatabase(_) => ErrorKind::NoDatabase,
        }
    }
}

/// Result type alias for driver operations.
pub type DbResult<T> = Result<T, DbError>;

/// Data-only mirror of the [`DbError`] variants, used in mapping tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Database,
    Operational,
    Programming,
    CannotConnect,
    Disconnect,
    BadPassword,
    Permission,
    DatabaseExists,
    NoDatabase,
}

impl ErrorKind {
    /// Construct the error of this kind carrying `message`.
    pub fn with_message(self, message: impl Into<String>) -> DbError {
        let message = message.into();
        match self {
            Self::Database => DbError::Database(message),
            Self::Operational => DbError::Operational(message),
            Self::Programming => DbError::Programming(message),
            Self::CannotConnect => DbError::CannotConnect(message),
            Self::Disconnect => DbError::Disconnect(message),
            Self::BadPassword => DbError::BadPassword(message),
            Self::Permission => DbError::Permission(message),
            Self::DatabaseExists => DbError::DatabaseExists(message),
            Self::NoDatabase => DbError::NoDatabase(message),
        }
    }
}

/// Per-adapter table from native error code to taxonomy kind.
///
/// The table is a plain `const` slice so the mapped set is inspectable and
/// statically enumerable. Codes absent from the table resolve to
/// [`ErrorKind::Database`].
#[derive(Debug, Clone, Copy)]
pub struct CodeMap {
    entries: &'static [(&'static str, ErrorKind)],
}

impl CodeMap {
    /// Wrap a static mapping table.
    pub const fn new(entries: &'static [(&'static str, ErrorKind)]) -> Self {
        Self { entries }
    }

    /// The mapped entries, for inspection.
    pub fn entries(&self) -> &'static [(&'static str, ErrorKind)] {
        self.entries
    }

    /// Resolve a native code to its kind; unmapped or missing codes fall
    /// through to the root kind.
    pub fn kind_for(&self, code: Option<&str>) -> ErrorKind {
        match code {
            Some(code) => self
                .entries
                .iter()
                .find(|(c, _)| *c == code)
                .map(|(_, kind)| *kind)
                .unwrap_or(ErrorKind::Database),
            None => ErrorKind::Database,
        }
    }

    /// The guarded-call wrapper: translate a native `sqlx` error into exactly
    /// one taxonomy kind, preserving the native message.
    ///
    /// Backend-reported errors go through the code table. Transport failures
    /// on an established session surface as `Disconnect`; option-parsing
    /// failures as `CannotConnect`; everything else as the root kind.
    pub fn translate(&self, err: sqlx::Error) -> DbError {
        match err {
            sqlx::Error::Database(native) => {
                let code = native.code().map(|c| c.to_string());
                self.kind_for(code.as_deref())
                    .with_message(native.message().to_string())
            }
            sqlx::Error::Configuration(msg) => DbError::CannotConnect(msg.to_string()),
            sqlx::Error::Io(io) => DbError::Disconnect(io.to_string()),
            sqlx::Error::Tls(tls) => DbError::Disconnect(tls.to_string()),
            sqlx::Error::Protocol(msg) => DbError::Disconnect(msg),
            other => DbError::Database(other.to_string()),
        }
    }

    /// Like [`translate`](Self::translate) but for errors raised while the
    /// native connection is being established, where transport failures mean
    /// the attempt itself failed.
    pub fn translate_connect(&self, err: sqlx::Error) -> DbError {
        match err {
            sqlx::Error::Database(_) => self.translate(err),
            sqlx::Error::Io(io) => DbError::CannotConnect(io.to_string()),
            sqlx::Error::Tls(tls) => DbError::CannotConnect(tls.to_string()),
            sqlx::Error::Protocol(msg) => DbError::CannotConnect(msg),
            other => self.translate(other),
        }
    }
}
