//! Relational adapter over SQLite.
//!
//! Statements are rendered as text with literals quoted by
//! [`SqliteDialect`]; identifiers are wrapped in double quotes.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use storm_core::{Dialect, Fields, SqliteDialect, Value, NOW};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{Adapter, Criteria, FindOptions};
use crate::config::ConnectionParams;
use crate::error::{OrmError, Result};
use crate::query::{apply_filters, count_query, Query};

const MEMORY_DATABASE: &str = ":memory:";

/// Adapter over a SQLite connection pool.
#[derive(Debug)]
pub struct RelationalBackend {
    params: ConnectionParams,
    pool: Mutex<Option<SqlitePool>>,
    connected: AtomicBool,
    dialect: SqliteDialect,
}

impl RelationalBackend {
    /// Creates an unconnected adapter. The database name is the SQLite file
    /// path, or `:memory:`.
    #[must_use]
    pub fn new(params: ConnectionParams) -> Self {
        Self {
            params,
            pool: Mutex::new(None),
            connected: AtomicBool::new(false),
            dialect: SqliteDialect::new(),
        }
    }

    /// Wraps an existing, already connected sqlx pool.
    #[must_use]
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self {
            params: ConnectionParams::default(),
            pool: Mutex::new(Some(pool)),
            connected: AtomicBool::new(true),
            dialect: SqliteDialect::new(),
        }
    }

    /// Returns the SQL dialect used to render statements.
    #[must_use]
    pub const fn dialect(&self) -> &SqliteDialect {
        &self.dialect
    }

    async fn open_pool(&self) -> Result<SqlitePool> {
        let database = self.params.database_name()?;
        let pool = if database == MEMORY_DATABASE {
            // One connection that never expires, or the database is lost.
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(SqliteConnectOptions::from_str(MEMORY_DATABASE)?)
                .await?
        } else {
            SqlitePoolOptions::new()
                .connect_with(
                    SqliteConnectOptions::new()
                        .filename(database)
                        .create_if_missing(true),
                )
                .await?
        };
        Ok(pool)
    }

    /// Connects if needed and returns a handle to the sqlx pool.
    async fn pool(&self) -> Result<SqlitePool> {
        let mut guard = self.pool.lock().await;
        if let Some(pool) = guard.as_ref() {
            return Ok(pool.clone());
        }
        let pool = self.open_pool().await?;
        *guard = Some(pool.clone());
        self.connected.store(true, Ordering::Release);
        info!(database = ?self.params.database, "Connected to relational store");
        Ok(pool)
    }

    async fn fetch(&self, sql: &str) -> Result<Vec<Fields>> {
        let pool = self.pool().await?;
        debug!(sql = %sql, "Executing SQL");
        let rows = sqlx::query(sql).fetch_all(&pool).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn fetch_count(&self, sql: &str) -> Result<u64> {
        let pool = self.pool().await?;
        debug!(sql = %sql, "Executing SQL");
        let count: i64 = sqlx::query_scalar(sql).fetch_one(&pool).await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn execute(&self, sql: &str) -> Result<sqlx::sqlite::SqliteQueryResult> {
        let pool = self.pool().await?;
        debug!(sql = %sql, "Executing SQL");
        Ok(sqlx::query(sql).execute(&pool).await?)
    }

    /// Renders `"a" = 1 AND "b" = 'x'`, using `IS NULL` for nulls.
    fn where_clause(&self, fields: &Fields) -> String {
        fields
            .iter()
            .map(|(name, value)| {
                let column = self.dialect.quote_identifier(name);
                if value.is_null() {
                    format!("{column} IS NULL")
                } else {
                    format!("{column} = {}", self.dialect.quote(value))
                }
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    fn select_sql(&self, table: &str, fields: &Fields) -> String {
        let mut sql = format!("SELECT * FROM {}", self.dialect.quote_identifier(table));
        if !fields.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.where_clause(fields));
        }
        sql
    }

    async fn select_by_fields(
        &self,
        table: &str,
        fields: &Fields,
        options: &FindOptions,
    ) -> Result<(Vec<Fields>, u64)> {
        let base = self.select_sql(table, fields);
        let mut sql = base.clone();
        if !options.sort.is_empty() {
            let order: Vec<String> = options
                .sort
                .iter()
                .map(|o| o.to_sql(&self.dialect))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }

        match options.window() {
            Some((offset, limit)) => {
                sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));
                let rows = self.fetch(&sql).await?;
                let total = self
                    .fetch_count(&count_query(&base)?)
                    .await?;
                Ok((rows, total))
            }
            None => {
                let rows = self.fetch(&sql).await?;
                let total = rows.len() as u64;
                Ok((rows, total))
            }
        }
    }

    async fn select_by_query(
        &self,
        table: &str,
        query: &Query,
        options: &FindOptions,
    ) -> Result<(Vec<Fields>, u64)> {
        query.validate()?;

        if !query.filters().is_empty() {
            let sql = query.to_sql(table, &self.dialect)?;
            let rows = self.fetch(&sql).await?;
            let (kept, removed) = apply_filters(rows, query.filters());
            debug!(kept = kept.len(), removed, "Applied post-fetch filters");
            let total = kept.len() as u64;
            let page = match options.window() {
                Some((offset, limit)) => kept
                    .into_iter()
                    .skip(usize::try_from(offset).unwrap_or(usize::MAX))
                    .take(usize::try_from(limit).unwrap_or(usize::MAX))
                    .collect(),
                None => kept,
            };
            return Ok((page, total));
        }

        let query = match options.window() {
            Some((offset, limit)) if query.limit_value().is_none() => {
                query.clone().limit(limit).offset(offset)
            }
            _ => query.clone(),
        };
        let rows = self.fetch(&query.to_sql(table, &self.dialect)?).await?;
        let total = if query.limit_value().is_some() {
            self.fetch_count(&query.count_sql(table, &self.dialect)?)
                .await?
        } else {
            rows.len() as u64
        };
        Ok((rows, total))
    }
}

/// Converts a row into a field map, keyed by column name.
fn decode_row(row: &SqliteRow) -> Result<Fields> {
    let mut fields = Fields::new();
    for column in row.columns() {
        let index = column.ordinal();
        let (is_null, type_name) = {
            let raw = row.try_get_raw(index)?;
            (raw.is_null(), raw.type_info().name().to_string())
        };
        let value = if is_null {
            Value::Null
        } else {
            match type_name.as_str() {
                "INTEGER" => Value::Int(row.try_get_unchecked::<i64, _>(index)?),
                "BOOLEAN" => Value::Bool(row.try_get_unchecked::<bool, _>(index)?),
                "REAL" => Value::Float(row.try_get_unchecked::<f64, _>(index)?),
                "BLOB" => Value::Bytes(row.try_get_unchecked::<Vec<u8>, _>(index)?),
                _ => Value::Text(row.try_get_unchecked::<String, _>(index)?),
            }
        };
        fields.insert(column.name().to_string(), value);
    }
    Ok(fields)
}

impl Adapter for RelationalBackend {
    async fn connect(&self) -> Result<()> {
        self.pool().await.map(|_| ())
    }

    async fn close(&self) -> Result<()> {
        let pool = self.pool.lock().await.take();
        if let Some(pool) = pool {
            pool.close().await;
            self.connected.store(false, Ordering::Release);
            info!(database = ?self.params.database, "Closed relational store connection");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn select_one(&self, table: &str, criteria: &Criteria) -> Result<Fields> {
        let rows = match criteria {
            Criteria::Fields(fields) => {
                let sql = format!("{} LIMIT 1", self.select_sql(table, fields));
                self.fetch(&sql).await?
            }
            Criteria::Query(query) => {
                query.validate()?;
                let rows = self.fetch(&query.to_sql(table, &self.dialect)?).await?;
                apply_filters(rows, query.filters()).0
            }
        };
        rows.into_iter().next().ok_or_else(|| OrmError::NotFound {
            table: table.to_string(),
            criteria: criteria.to_string(),
        })
    }

    async fn select_multiple(
        &self,
        table: &str,
        criteria: &Criteria,
        options: &FindOptions,
    ) -> Result<(Vec<Fields>, u64)> {
        match criteria {
            Criteria::Fields(fields) => self.select_by_fields(table, fields, options).await,
            Criteria::Query(query) => self.select_by_query(table, query, options).await,
        }
    }

    async fn insert(&self, table: &str, fields: &Fields) -> Result<Value> {
        let sql = if fields.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", self.dialect.quote_identifier(table))
        } else {
            let columns: Vec<String> = fields
                .keys()
                .map(|name| self.dialect.quote_identifier(name))
                .collect();
            let values: Vec<String> = fields.values().map(|v| self.dialect.quote(v)).collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.dialect.quote_identifier(table),
                columns.join(", "),
                values.join(", ")
            )
        };
        let result = self.execute(&sql).await?;
        Ok(Value::Int(result.last_insert_rowid()))
    }

    async fn update(
        &self,
        table: &str,
        fields: &Fields,
        changes: &[String],
        key: &Fields,
    ) -> Result<u64> {
        let assignments: Vec<String> = changes
            .iter()
            .filter(|name| key.get(name.as_str()) != fields.get(name.as_str()))
            .map(|name| {
                let value = fields.get(name).unwrap_or(&Value::Null);
                format!(
                    "{} = {}",
                    self.dialect.quote_identifier(name),
                    self.dialect.quote(value)
                )
            })
            .collect();
        if assignments.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            self.dialect.quote_identifier(table),
            assignments.join(", "),
            self.where_clause(key)
        );
        Ok(self.execute(&sql).await?.rows_affected())
    }

    async fn delete(&self, table: &str, key: &Fields) -> Result<u64> {
        if key.is_empty() {
            return Err(OrmError::Constraint(String::from(
                "refusing to delete without a key",
            )));
        }
        let sql = format!(
            "DELETE FROM {} WHERE {}",
            self.dialect.quote_identifier(table),
            self.where_clause(key)
        );
        Ok(self.execute(&sql).await?.rows_affected())
    }

    fn server_timestamp(&self) -> Value {
        Value::Text(NOW.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Filter;
    use storm_core::fields;

    async fn backend() -> RelationalBackend {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE posts (id INTEGER PRIMARY KEY AUTOINCREMENT, title TEXT, score REAL, status TEXT)",
        )
        .execute(&pool)
        .await
        .unwrap();
        RelationalBackend::with_pool(pool)
    }

    #[tokio::test]
    async fn test_insert_returns_rowid() {
        let db = backend().await;
        let first = db.insert("posts", &fields! { "title" => "a" }).await.unwrap();
        let second = db.insert("posts", &fields! { "title" => "b" }).await.unwrap();
        assert_eq!(first, Value::Int(1));
        assert_eq!(second, Value::Int(2));
    }

    #[tokio::test]
    async fn test_row_decoding() {
        let db = backend().await;
        db.insert("posts", &fields! { "title" => "it's", "score" => 1.5 })
            .await
            .unwrap();
        let row = db
            .select_one("posts", &fields! { "id" => 1 }.into())
            .await
            .unwrap();
        assert_eq!(row["title"], Value::Text("it's".into()));
        assert_eq!(row["score"], Value::Float(1.5));
        assert_eq!(row["status"], Value::Null);
    }

    #[tokio::test]
    async fn test_select_one_not_found() {
        let db = backend().await;
        let err = db
            .select_one("posts", &fields! { "id" => 42 }.into())
            .await
            .unwrap_err();
        assert!(matches!(err, OrmError::NotFound { ref table, .. } if table == "posts"));
    }

    #[tokio::test]
    async fn test_update_skips_unchanged_key_fields() {
        let db = backend().await;
        db.insert("posts", &fields! { "title" => "a" }).await.unwrap();
        let fields = fields! { "id" => 1, "title" => "b" };
        let key = fields! { "id" => 1 };
        let changes = vec!["id".to_string(), "title".to_string()];
        assert_eq!(db.update("posts", &fields, &changes, &key).await.unwrap(), 1);
        assert_eq!(
            db.update("posts", &fields, &["id".to_string()], &key).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_update_moves_changed_key() {
        let db = backend().await;
        db.insert("posts", &fields! { "title" => "a" }).await.unwrap();
        let fields = fields! { "id" => 9, "title" => "a" };
        let key = fields! { "id" => 1 };
        assert_eq!(
            db.update("posts", &fields, &["id".to_string()], &key).await.unwrap(),
            1
        );
        let row = db
            .select_one("posts", &fields! { "id" => 9 }.into())
            .await
            .unwrap();
        assert_eq!(row["title"], Value::Text("a".into()));
        assert!(db
            .select_one("posts", &fields! { "id" => 1 }.into())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_now_sentinel_stores_server_time() {
        let db = backend().await;
        db.insert("posts", &fields! { "status" => db.server_timestamp() })
            .await
            .unwrap();
        let row = db.select_one("posts", &Criteria::all()).await.unwrap();
        let stamped = row["status"].as_str().unwrap();
        assert_ne!(stamped, NOW);
        assert_eq!(stamped.len(), "2024-01-01 00:00:00".len());
    }

    #[tokio::test]
    async fn test_select_multiple_by_fields_paginates() {
        let db = backend().await;
        for n in 0..25_i32 {
            db.insert("posts", &fields! { "score" => f64::from(n), "status" => "open" })
                .await
                .unwrap();
        }
        let options = FindOptions::new().page(3).page_size(10).sort("-score");
        let (rows, total) = db
            .select_multiple("posts", &fields! { "status" => "open" }.into(), &options)
            .await
            .unwrap();
        assert_eq!(total, 25);
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0]["score"], Value::Float(4.0));
    }

    #[tokio::test]
    async fn test_query_with_limit_counts_everything() {
        let db = backend().await;
        for n in 0..7 {
            db.insert("posts", &fields! { "score" => n }).await.unwrap();
        }
        let query = Query::new("SELECT * FROM {table} WHERE score >= {min} ORDER BY id")
            .bind("min", 2)
            .limit(3);
        let (rows, total) = db
            .select_multiple("posts", &query.into(), &FindOptions::new())
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(total, 5);
    }

    #[tokio::test]
    async fn test_query_filters_count_survivors() {
        let db = backend().await;
        for (status, score) in [("active", 60), ("active", 10), ("closed", 90)] {
            db.insert("posts", &fields! { "status" => status, "score" => score })
                .await
                .unwrap();
        }
        let query = Query::new("SELECT * FROM {table}")
            .filter(Filter::eq("status", "active"))
            .filter(Filter::gt("score", 50));
        let (rows, total) = db
            .select_multiple("posts", &query.into(), &FindOptions::new())
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0]["score"], Value::Float(60.0));
    }

    #[tokio::test]
    async fn test_delete_requires_key() {
        let db = backend().await;
        let err = db.delete("posts", &Fields::new()).await.unwrap_err();
        assert!(matches!(err, OrmError::Constraint(_)));
    }

    #[tokio::test]
    async fn test_memory_database_from_params() {
        let db = RelationalBackend::new(ConnectionParams::new(":memory:"));
        assert!(!db.is_connected());
        db.connect().await.unwrap();
        assert!(db.is_connected());
        db.close().await.unwrap();
        assert!(!db.is_connected());
    }
}
