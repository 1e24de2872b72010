use arrow::json::writer::JsonArray;
use arrow::json::WriterBuilder;
use arrow::record_batch::RecordBatch;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::db_pool::DuckDbPool;
use super::DbError;

/// Rows in result order, each keyed by column name in select-list order.
pub type QueryResult = Vec<Map<String, Value>>;

static READ_STATEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*(?:--[^\n]*\n\s*)*(select|with|show|describe|values)\b")
        .expect("read statement pattern is valid")
});

// EXPLAIN ANALYZE runs the wrapped statement, so the remainder is checked too
static EXPLAIN_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*(?:--[^\n]*\n\s*)*explain(?:\s+analyze)?\b")
        .expect("explain prefix pattern is valid")
});

/// Runs model-generated SQL verbatim against the shared database.
#[derive(Clone)]
pub struct SqlExecutor {
    pool: DuckDbPool,
    timeout: Duration,
    read_only_guard: bool,
}

impl SqlExecutor {
    pub fn new(pool: DuckDbPool, timeout: Duration) -> Self {
        Self {
            pool,
            timeout,
            read_only_guard: false,
        }
    }

    pub fn with_read_only_guard(mut self, enabled: bool) -> Self {
        self.read_only_guard = enabled;
        self
    }

    pub async fn execute(&self, sql: &str) -> Result<QueryResult, DbError> {
        if self.read_only_guard {
            check_read_only(sql)?;
        }

        info!("Executing SQL: {}", sql);
        let pool = self.pool.clone();
        let sql = sql.to_string();
        let task = tokio::task::spawn_blocking(move || run_query(&pool, &sql));

        // A timed-out query keeps its blocking thread until DuckDB returns
        match tokio::time::timeout(self.timeout, task).await {
            Ok(joined) => joined?,
            Err(_) => Err(DbError::Timeout(self.timeout)),
        }
    }
}

fn check_read_only(sql: &str) -> Result<(), DbError> {
    if let Some(prefix) = EXPLAIN_PREFIX.find(sql) {
        return check_read_only(&sql[prefix.end()..]);
    }
    if !READ_STATEMENT.is_match(sql) {
        return Err(DbError::Rejected("only read statements may be executed".to_string()));
    }
    if has_trailing_statement(sql) {
        return Err(DbError::Rejected("multiple statements are not allowed".to_string()));
    }
    Ok(())
}

/// True when anything but whitespace follows a `;` outside quoted text and
/// `--` comments.
fn has_trailing_statement(sql: &str) -> bool {
    let mut quote: Option<char> = None;
    let mut in_comment = false;
    let mut chars = sql.char_indices().peekable();
    while let Some((offset, ch)) = chars.next() {
        if in_comment {
            in_comment = ch != '\n';
            continue;
        }
        match (quote, ch) {
            // A doubled quote closes and reopens, which leaves the state unchanged
            (Some(open), _) if ch == open => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(ch),
            (None, '-') if matches!(chars.peek(), Some((_, '-'))) => in_comment = true,
            (None, ';') => return !sql[offset + 1..].trim().is_empty(),
            _ => {}
        }
    }
    false
}

fn run_query(pool: &DuckDbPool, sql: &str) -> Result<QueryResult, DbError> {
    let start_time = Instant::now();
    let conn = pool.get()?;
    let mut stmt = conn.prepare(sql)?;
    let batches: Vec<RecordBatch> = stmt.query_arrow([])?.collect();

    let rows = batches_to_rows(&batches)?;
    info!(
        "Query executed successfully. Row count: {}, Execution time: {}ms",
        rows.len(),
        start_time.elapsed().as_millis()
    );
    Ok(rows)
}

fn batches_to_rows(batches: &[RecordBatch]) -> Result<QueryResult, DbError> {
    let row_count: usize = batches.iter().map(|b| b.num_rows()).sum();
    if row_count == 0 {
        return Ok(Vec::new());
    }

    let mut writer = WriterBuilder::new()
        .with_explicit_nulls(true)
        .build::<_, JsonArray>(Vec::new());
    let refs: Vec<&RecordBatch> = batches.iter().collect();
    writer
        .write_batches(&refs)
        .map_err(|e| DbError::QueryError(format!("Failed to serialize result rows: {}", e)))?;
    writer
        .finish()
        .map_err(|e| DbError::QueryError(format!("Failed to serialize result rows: {}", e)))?;

    let buffer = writer.into_inner();
    debug!("Serialized {} rows into {} bytes", row_count, buffer.len());
    serde_json::from_slice(&buffer)
        .map_err(|e| DbError::QueryError(format!("Failed to decode result rows: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::db_pool::memory_pool;
    use serde_json::json;

    fn seeded_executor() -> SqlExecutor {
        let pool = memory_pool();
        pool.get()
            .unwrap()
            .execute_batch(
                "CREATE TABLE sales_data (dt VARCHAR, amt DOUBLE, pymt VARCHAR);
                 INSERT INTO sales_data VALUES
                    ('2024-04-03', 10000.25, 'CC'),
                    ('2024-04-19', 5234.25, NULL),
                    ('2024-05-02', 99.0, 'CASH');",
            )
            .unwrap();
        SqlExecutor::new(pool, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn returns_rows_keyed_by_column() {
        let executor = seeded_executor();
        let rows = executor
            .execute(
                "SELECT SUM(amt) AS total FROM sales_data \
                 WHERE dt >= '2024-04-01' AND dt < '2024-05-01'",
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["total"], json!(15234.5));
    }

    #[tokio::test]
    async fn keeps_nulls_and_column_order() {
        let executor = seeded_executor();
        let rows = executor
            .execute("SELECT pymt, dt FROM sales_data ORDER BY dt")
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1]["pymt"], Value::Null);
        assert_eq!(rows[0].keys().collect::<Vec<_>>(), vec!["pymt", "dt"]);
    }

    #[tokio::test]
    async fn empty_result_is_empty_rows() {
        let executor = seeded_executor();
        let rows = executor
            .execute("SELECT * FROM sales_data WHERE amt < 0")
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn surfaces_database_error_text() {
        let executor = seeded_executor();
        let err = executor.execute("SELECT nope FROM sales_data").await.unwrap_err();
        assert!(matches!(err, DbError::QueryError(_)));
        assert!(err.to_string().contains("nope"));
    }

    #[tokio::test]
    async fn guard_is_off_by_default() {
        let executor = seeded_executor();
        executor
            .execute("INSERT INTO sales_data VALUES ('2024-06-01', 1.0, 'CC')")
            .await
            .unwrap();
        let rows = executor
            .execute("SELECT COUNT(*) AS n FROM sales_data")
            .await
            .unwrap();
        assert_eq!(rows[0]["n"], json!(4));
    }

    #[tokio::test]
    async fn guard_rejects_writes_and_stacked_statements() {
        let executor = seeded_executor().with_read_only_guard(true);

        let err = executor.execute("DELETE FROM sales_data").await.unwrap_err();
        assert!(matches!(err, DbError::Rejected(_)));

        let err = executor
            .execute("SELECT 1; DROP TABLE sales_data")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Rejected(_)));

        let err = executor
            .execute("EXPLAIN ANALYZE DELETE FROM sales_data")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Rejected(_)));
        let rows = executor
            .execute("SELECT COUNT(*) AS n FROM sales_data")
            .await
            .unwrap();
        assert_eq!(rows[0]["n"], json!(3));

        let err = executor.execute("PRAGMA threads = 1").await.unwrap_err();
        assert!(matches!(err, DbError::Rejected(_)));

        let rows = executor
            .execute("-- totals\nWITH t AS (SELECT amt FROM sales_data) SELECT COUNT(*) AS n FROM t;")
            .await
            .unwrap();
        assert_eq!(rows[0]["n"], json!(3));
    }

    #[tokio::test]
    async fn guard_allows_semicolons_inside_literals() {
        let executor = seeded_executor().with_read_only_guard(true);

        let rows = executor
            .execute("SELECT COUNT(*) AS n FROM sales_data WHERE pymt NOT IN ('a;b', 'it''s;x')")
            .await
            .unwrap();
        assert_eq!(rows[0]["n"], json!(2));

        let rows = executor
            .execute("EXPLAIN SELECT amt FROM sales_data")
            .await
            .unwrap();
        assert!(!rows.is_empty());
    }

    #[test]
    fn trailing_statement_detection_skips_quoted_text() {
        assert!(has_trailing_statement("SELECT 1; SELECT 2"));
        assert!(!has_trailing_statement("SELECT 1;  \n"));
        assert!(!has_trailing_statement("SELECT ';drop' AS \"a;b\""));
        assert!(has_trailing_statement("SELECT 'x''y'; DROP TABLE t"));
        assert!(!has_trailing_statement("-- top; products\nSELECT 1"));
        assert!(has_trailing_statement("-- note\nSELECT 1; DELETE FROM t"));
    }

    #[tokio::test]
    async fn slow_query_times_out() {
        let executor = SqlExecutor::new(seeded_executor().pool, Duration::from_millis(1));
        let err = executor
            .execute("SELECT SUM(hash(i)) AS h FROM range(50000000) t(i)")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Timeout(_)));
        assert!(err.to_string().contains("timed out"));
    }
}
