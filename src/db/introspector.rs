use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use super::db_pool::DuckDbPool;
use super::DbError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub declared_type: String,
}

/// Tables in enumeration order, each with its columns in declaration order.
///
/// Serializes as a JSON object keyed by table name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDescriptor {
    tables: Vec<(String, Vec<ColumnDescriptor>)>,
}

impl SchemaDescriptor {
    pub fn new(tables: Vec<(String, Vec<ColumnDescriptor>)>) -> Self {
        Self { tables }
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|(name, _)| name.as_str())
    }
}

impl Serialize for SchemaDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.tables.len()))?;
        for (table, columns) in &self.tables {
            map.serialize_entry(table, columns)?;
        }
        map.end()
    }
}

/// Reads the live table and column layout. Nothing is cached; every call
/// goes back to the database.
#[derive(Clone)]
pub struct SchemaIntrospector {
    pool: DuckDbPool,
    schema: String,
    hidden_tables: Vec<String>,
    concurrency: usize,
}

impl SchemaIntrospector {
    pub fn new(pool: DuckDbPool, schema: String, concurrency: usize) -> Self {
        Self {
            pool,
            schema,
            hidden_tables: Vec::new(),
            concurrency: concurrency.max(1),
        }
    }

    /// Tables that must never be described to the model.
    pub fn hide_table(mut self, table: impl Into<String>) -> Self {
        self.hidden_tables.push(table.into());
        self
    }

    pub async fn describe(&self) -> Result<SchemaDescriptor, DbError> {
        let tables = self.list_tables().await?;
        if tables.is_empty() {
            info!("No tables found in schema '{}'", self.schema);
            return Ok(SchemaDescriptor::default());
        }

        // One column lookup per table, at most `concurrency` in flight
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut lookups = JoinSet::new();
        for table in &tables {
            let pool = self.pool.clone();
            let schema = self.schema.clone();
            let table = table.clone();
            let permits = Arc::clone(&permits);
            lookups.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| DbError::TaskError(e.to_string()))?;
                let columns = tokio::task::spawn_blocking({
                    let table = table.clone();
                    move || list_columns(&pool, &schema, &table)
                })
                .await??;
                Ok::<_, DbError>((table, columns))
            });
        }

        let mut by_table = HashMap::with_capacity(tables.len());
        while let Some(joined) = lookups.join_next().await {
            let (table, columns) = joined??;
            debug!("Described table {} ({} columns)", table, columns.len());
            by_table.insert(table, columns);
        }

        // Reassemble in enumeration order, not completion order
        let mut ordered = Vec::with_capacity(tables.len());
        for table in tables {
            let columns = by_table.remove(&table).ok_or_else(|| {
                DbError::QueryError(format!("No column listing returned for table {}", table))
            })?;
            ordered.push((table, columns));
        }

        info!("Described {} tables in schema '{}'", ordered.len(), self.schema);
        Ok(SchemaDescriptor::new(ordered))
    }

    async fn list_tables(&self) -> Result<Vec<String>, DbError> {
        let pool = self.pool.clone();
        let schema = self.schema.clone();
        let hidden = self.hidden_tables.clone();

        tokio::task::spawn_blocking(move || -> Result<Vec<String>, DbError> {
            let conn = pool.get()?;
            let mut stmt = conn.prepare(
                "SELECT table_name FROM duckdb_tables() \
                 WHERE NOT internal AND database_name = current_database() \
                   AND schema_name = ? \
                 ORDER BY table_oid",
            )?;
            let tables = stmt
                .query_map([&schema], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(tables
                .into_iter()
                .filter(|t| !hidden.iter().any(|h| h.eq_ignore_ascii_case(t)))
                .collect())
        })
        .await?
    }
}

fn list_columns(
    pool: &DuckDbPool,
    schema: &str,
    table: &str,
) -> Result<Vec<ColumnDescriptor>, DbError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT column_name, data_type FROM duckdb_columns() \
         WHERE database_name = current_database() \
           AND schema_name = ? AND table_name = ? \
         ORDER BY column_index",
    )?;
    let columns = stmt
        .query_map([schema, table], |row| {
            Ok(ColumnDescriptor {
                name: row.get(0)?,
                declared_type: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::db_pool::memory_pool;

    fn introspector(pool: &DuckDbPool) -> SchemaIntrospector {
        SchemaIntrospector::new(pool.clone(), "main".to_string(), 2)
    }

    #[tokio::test]
    async fn empty_database_yields_empty_descriptor() {
        let pool = memory_pool();
        let schema = introspector(&pool).describe().await.unwrap();
        assert!(schema.is_empty());
        assert_eq!(serde_json::to_string(&schema).unwrap(), "{}");
    }

    #[tokio::test]
    async fn describes_every_table_in_creation_order() {
        let pool = memory_pool();
        pool.get()
            .unwrap()
            .execute_batch(
                "CREATE TABLE stores (str_id VARCHAR, loc VARCHAR, sz DOUBLE);
                 CREATE TABLE sales_data (dt VARCHAR, amt DOUBLE);
                 CREATE TABLE products (pid VARCHAR, p DOUBLE, x1 VARCHAR);
                 CREATE TABLE customers (cid VARCHAR, seg VARCHAR);
                 CREATE TABLE campaigns (camp_id VARCHAR, bgt DOUBLE);",
            )
            .unwrap();

        let schema = introspector(&pool).describe().await.unwrap();
        assert_eq!(schema.len(), 5);
        assert_eq!(
            schema.table_names().collect::<Vec<_>>(),
            vec!["stores", "sales_data", "products", "customers", "campaigns"]
        );
        assert_eq!(
            schema.tables[1].1,
            vec![
                ColumnDescriptor { name: "dt".into(), declared_type: "VARCHAR".into() },
                ColumnDescriptor { name: "amt".into(), declared_type: "DOUBLE".into() },
            ]
        );
        assert_eq!(schema.tables[2].1.len(), 3);
    }

    #[tokio::test]
    async fn hidden_tables_are_left_out() {
        let pool = memory_pool();
        pool.get()
            .unwrap()
            .execute_batch(
                "CREATE TABLE sales_data (dt VARCHAR, amt DOUBLE);
                 CREATE TABLE chat_history (user_id VARCHAR, question VARCHAR);",
            )
            .unwrap();

        let schema = introspector(&pool).hide_table("chat_history").describe().await.unwrap();
        assert_eq!(schema.table_names().collect::<Vec<_>>(), vec!["sales_data"]);
    }

    #[tokio::test]
    async fn attached_databases_are_not_merged() {
        let pool = memory_pool();
        pool.get()
            .unwrap()
            .execute_batch(
                "CREATE TABLE sales_data (dt VARCHAR, amt DOUBLE);
                 ATTACH ':memory:' AS archive;
                 CREATE TABLE archive.main.sales_data (legacy_id INTEGER);
                 CREATE TABLE archive.main.audit_log (entry VARCHAR);",
            )
            .unwrap();

        let schema = introspector(&pool).describe().await.unwrap();
        assert_eq!(schema.table_names().collect::<Vec<_>>(), vec!["sales_data"]);
        assert_eq!(
            schema.tables[0].1.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            vec!["dt", "amt"]
        );
    }

    #[tokio::test]
    async fn serializes_as_table_keyed_object() {
        let pool = memory_pool();
        pool.get()
            .unwrap()
            .execute_batch("CREATE TABLE sales_data (dt VARCHAR, amt DOUBLE);")
            .unwrap();

        let schema = introspector(&pool).describe().await.unwrap();
        assert_eq!(
            serde_json::to_value(&schema).unwrap(),
            serde_json::json!({
                "sales_data": [
                    { "name": "dt", "type": "VARCHAR" },
                    { "name": "amt", "type": "DOUBLE" }
                ]
            })
        );
    }
}
