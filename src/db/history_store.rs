use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::error::Error;
use std::fmt;
use tracing::debug;

use super::db_pool::DuckDbPool;
use super::DbError;

/// One answered question, as persisted for the asking user.
#[derive(Debug, Clone)]
pub struct HistoryRecord {
    pub user_id: String,
    pub question: String,
    pub response_json: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct HistoryError(pub String);

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to save chat history: {}", self.0)
    }
}

impl Error for HistoryError {}

impl From<DbError> for HistoryError {
    fn from(e: DbError) -> Self {
        HistoryError(e.to_string())
    }
}

/// Append-only sink for answered questions.
#[async_trait]
pub trait HistoryRecorder: Send + Sync {
    async fn record(
        &self,
        actor_id: &str,
        question: &str,
        response_json: &str,
    ) -> Result<(), HistoryError>;
}

/// Used when history is disabled in configuration.
pub struct DiscardHistory;

#[async_trait]
impl HistoryRecorder for DiscardHistory {
    async fn record(&self, _: &str, _: &str, _: &str) -> Result<(), HistoryError> {
        Ok(())
    }
}

pub struct DuckDbHistoryStore {
    pool: DuckDbPool,
    table: String,
}

impl DuckDbHistoryStore {
    /// `table` must already be validated as a plain identifier.
    pub fn new(pool: DuckDbPool, table: String) -> Self {
        Self { pool, table }
    }

    pub async fn ensure_table(&self) -> Result<(), DbError> {
        let pool = self.pool.clone();
        let ddl = format!(
            "CREATE SEQUENCE IF NOT EXISTS \"{table}_id_seq\";
             CREATE TABLE IF NOT EXISTS \"{table}\" (
                 id BIGINT PRIMARY KEY DEFAULT nextval('{table}_id_seq'),
                 user_id VARCHAR NOT NULL,
                 question VARCHAR NOT NULL,
                 response VARCHAR NOT NULL,
                 created_at TIMESTAMP NOT NULL
             );",
            table = self.table
        );

        tokio::task::spawn_blocking(move || -> Result<(), DbError> {
            pool.get()?.execute_batch(&ddl)?;
            Ok(())
        })
        .await?
    }

    fn insert(pool: &DuckDbPool, table: &str, record: &HistoryRecord) -> Result<(), DbError> {
        let conn = pool.get()?;
        let sql = format!(
            "INSERT INTO \"{}\" (user_id, question, response, created_at) \
             VALUES (?, ?, ?, CAST(? AS TIMESTAMP))",
            table
        );
        let created_at = record.created_at.format("%Y-%m-%d %H:%M:%S%.6f").to_string();
        conn.execute(
            &sql,
            duckdb::params![
                record.user_id,
                record.question,
                record.response_json,
                created_at
            ],
        )?;
        Ok(())
    }
}

#[async_trait]
impl HistoryRecorder for DuckDbHistoryStore {
    async fn record(
        &self,
        actor_id: &str,
        question: &str,
        response_json: &str,
    ) -> Result<(), HistoryError> {
        let record = HistoryRecord {
            user_id: actor_id.to_string(),
            question: question.to_string(),
            response_json: response_json.to_string(),
            created_at: Utc::now(),
        };

        let pool = self.pool.clone();
        let table = self.table.clone();
        tokio::task::spawn_blocking(move || Self::insert(&pool, &table, &record))
            .await
            .map_err(DbError::from)??;

        debug!("Saved chat history for user {}", actor_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::db_pool::memory_pool;

    #[tokio::test]
    async fn appends_records() {
        let pool = memory_pool();
        let store = DuckDbHistoryStore::new(pool.clone(), "chat_history".to_string());
        store.ensure_table().await.unwrap();
        // Idempotent on restart
        store.ensure_table().await.unwrap();

        store.record("42", "What's the capital of France?", "{\"isChat\":true}").await.unwrap();
        store.record("42", "Total sales?", "{\"sql\":\"SELECT 1\"}").await.unwrap();

        let conn = pool.get().unwrap();
        let mut stmt = conn
            .prepare("SELECT id, user_id, question FROM chat_history ORDER BY id")
            .unwrap();
        let rows: Vec<(i64, String, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert!(rows[0].0 < rows[1].0);
        assert_eq!(rows[0].1, "42");
        assert_eq!(rows[1].2, "Total sales?");
    }

    #[tokio::test]
    async fn missing_table_is_an_error() {
        let store = DuckDbHistoryStore::new(memory_pool(), "chat_history".to_string());
        assert!(store.record("1", "q", "{}").await.is_err());
    }
}
