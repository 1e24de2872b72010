use duckdb::Connection;
use r2d2::{ManageConnection, Pool};
use std::sync::Mutex;

use crate::config::DatabaseConfig;

pub type DuckDbPool = Pool<DuckDBConnectionManager>;

/// Hands out clones of a single opened database.
///
/// DuckDB only allows one database instance per file within a process, so
/// every pooled connection is a `try_clone` of the root connection. This
/// also lets `:memory:` databases be shared across the pool.
pub struct DuckDBConnectionManager {
    root: Mutex<Connection>,
}

impl DuckDBConnectionManager {
    pub fn open(path: &str) -> Result<Self, duckdb::Error> {
        let root = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        Ok(Self {
            root: Mutex::new(root),
        })
    }
}

impl ManageConnection for DuckDBConnectionManager {
    type Connection = Connection;
    type Error = duckdb::Error;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let root = self.root.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        root.try_clone()
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.execute("SELECT 1", [])?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

pub fn build_pool(config: &DatabaseConfig) -> Result<DuckDbPool, Box<dyn std::error::Error>> {
    let manager = DuckDBConnectionManager::open(&config.path)?;
    let pool = Pool::builder()
        .max_size(config.pool_size as u32)
        .build(manager)?;
    Ok(pool)
}

#[cfg(test)]
pub fn memory_pool() -> DuckDbPool {
    let manager = DuckDBConnectionManager::open(":memory:").unwrap();
    Pool::builder().max_size(4).build(manager).unwrap()
}

/// One connection with a short checkout timeout; holding it starves the pool.
#[cfg(test)]
pub fn single_connection_pool() -> DuckDbPool {
    let manager = DuckDBConnectionManager::open(":memory:").unwrap();
    Pool::builder()
        .max_size(1)
        .connection_timeout(std::time::Duration::from_millis(50))
        .build(manager)
        .unwrap()
}
