pub mod db_pool;
pub mod executor;
pub mod history_store;
pub mod introspector;

use std::error::Error;
use std::fmt;
use std::time::Duration;

#[derive(Debug)]
pub enum DbError {
    PoolError(String),
    QueryError(String),
    TaskError(String),
    Timeout(Duration),
    Rejected(String),
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbError::PoolError(msg) => write!(f, "Database connection error: {}", msg),
            DbError::QueryError(msg) => write!(f, "{}", msg),
            DbError::TaskError(msg) => write!(f, "Database task execution failed: {}", msg),
            DbError::Timeout(limit) => write!(f, "Query timed out after {:?}", limit),
            DbError::Rejected(msg) => write!(f, "Statement rejected: {}", msg),
        }
    }
}

impl Error for DbError {}

impl From<r2d2::Error> for DbError {
    fn from(e: r2d2::Error) -> Self {
        DbError::PoolError(e.to_string())
    }
}

impl From<duckdb::Error> for DbError {
    fn from(e: duckdb::Error) -> Self {
        DbError::QueryError(e.to_string())
    }
}

impl From<tokio::task::JoinError> for DbError {
    fn from(e: tokio::task::JoinError) -> Self {
        DbError::TaskError(e.to_string())
    }
}
