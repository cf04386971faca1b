//! Driver registry and the crate's dispatch entry points.
//!
//! A backend is selected declaratively: the configuration names a driver,
//! the registry resolves that name to a pre-registered [`DriverRecord`] and
//! dispatches to its entry points. The supported set is statically
//! enumerable; nothing is loaded by name at call time beyond this lookup.

use std::collections::HashMap;
use std::sync::LazyLock;

use futures_util::future::BoxFuture;
use tracing::debug;

use crate::config::DbConfig;
use crate::db::connection::Connection;
use crate::db::{mysql, postgres, sqlite};
use crate::error::{DbError, DbResult};

/// Future returned by a driver's `connect` entry point.
pub type ConnectFuture<'a> = BoxFuture<'a, DbResult<Box<dyn Connection>>>;

/// Future returned by a driver's `create`/`drop` entry points.
pub type AdminFuture<'a> = BoxFuture<'a, DbResult<()>>;

/// Entry points of one registered backend adapter.
#[derive(Clone, Copy)]
pub struct DriverRecord {
    /// Canonical driver name.
    pub name: &'static str,
    /// Open a connection to the configured database.
    pub connect: for<'a> fn(&'a DbConfig) -> ConnectFuture<'a>,
    /// Create the configured database.
    pub create: for<'a> fn(&'a DbConfig) -> AdminFuture<'a>,
    /// Delete the configured database.
    pub drop: for<'a> fn(&'a DbConfig) -> AdminFuture<'a>,
}

impl std::fmt::Debug for DriverRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRecord")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Mapping from backend identifier to adapter record.
#[derive(Debug)]
pub struct DriverRegistry {
    drivers: HashMap<String, DriverRecord>,
}

impl DriverRegistry {
    /// A registry with no drivers; register your own.
    pub fn empty() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    /// The built-in set: sqlite, mysql (alias "mariadb") and postgresql
    /// (alias "postgres").
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        let mysql = mysql::driver();
        let postgres = postgres::driver();
        registry.register(sqlite::driver());
        registry.register(mysql);
        registry.register(postgres);
        registry.drivers.insert("mariadb".to_string(), mysql);
        registry.drivers.insert("postgres".to_string(), postgres);
        registry
    }

    /// Register an adapter under its canonical name. A record registered
    /// later under an existing name replaces the earlier one.
    pub fn register(&mut self, record: DriverRecord) {
        self.drivers.insert(record.name.to_string(), record);
    }

    /// Register `alias` for an already registered driver.
    pub fn alias(&mut self, alias: impl Into<String>, driver: &str) -> DbResult<()> {
        let record = *self.resolve(driver)?;
        self.drivers.insert(alias.into(), record);
        Ok(())
    }

    /// Resolve a backend identifier to its record; unknown identifiers are a
    /// [`DbError::Programming`].
    pub fn resolve(&self, driver: &str) -> DbResult<&DriverRecord> {
        self.drivers.get(driver).ok_or_else(|| {
            DbError::programming(format!(
                "unknown database driver '{driver}' (registered: {})",
                self.driver_names().join(", ")
            ))
        })
    }

    /// The registered identifiers, sorted.
    pub fn driver_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.drivers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Open a connection to the database named by `config`.
    pub async fn connect(&self, config: &DbConfig) -> DbResult<Box<dyn Connection>> {
        config.validate()?;
        let record = self.resolve(&config.driver)?;
        debug!(driver = record.name, target = %config.masked(), "dispatching connect");
        (record.connect)(config).await
    }

    /// Create the database named by `config`. Fails with
    /// [`DbError::DatabaseExists`] when it already exists.
    pub async fn create_database(&self, config: &DbConfig) -> DbResult<()> {
        config.validate()?;
        let record = self.resolve(&config.driver)?;
        debug!(driver = record.name, target = %config.masked(), "dispatching create");
        (record.create)(config).await
    }

    /// Delete the database named by `config`. Fails with
    /// [`DbError::NoDatabase`] when it does not exist.
    pub async fn drop_database(&self, config: &DbConfig) -> DbResult<()> {
        config.validate()?;
        let record = self.resolve(&config.driver)?;
        debug!(driver = record.name, target = %config.masked(), "dispatching drop");
        (record.drop)(config).await
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

static DEFAULT_REGISTRY: LazyLock<DriverRegistry> = LazyLock::new(DriverRegistry::builtin);

/// Open a connection using the built-in driver set.
pub async fn connect(config: &DbConfig) -> DbResult<Box<dyn Connection>> {
    DEFAULT_REGISTRY.connect(config).await
}

/// Create the configured database using the built-in driver set.
pub async fn create_database(config: &DbConfig) -> DbResult<()> {
    DEFAULT_REGISTRY.create_database(config).await
}

/// Delete the configured database using the built-in driver set.
pub async fn drop_database(config: &DbConfig) -> DbResult<()> {
    DEFAULT_REGISTRY.drop_database(config).await
}
