//! Document-store adapter.
//!
//! The adapter talks to a [`DocumentStore`] driver client. Identifiers are
//! strings: `_id` values in criteria and keys are normalized to text before
//! they reach the driver.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::future::BoxFuture;
use storm_core::{Fields, Value};
use tracing::{debug, info};

use super::{Adapter, Criteria, FindOptions};
use crate::config::ConnectionParams;
use crate::error::{OrmError, Result};
use crate::query::OrderBy;

/// Document identifier field.
pub const ID_FIELD: &str = "_id";

/// Cursor options for [`DocumentStore::find`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindSpec {
    /// Documents to skip.
    pub skip: Option<u64>,
    /// Maximum documents to return.
    pub limit: Option<u64>,
    /// Sort keys, applied in order.
    pub sort: Vec<OrderBy>,
}

/// Driver client for a document store.
///
/// Filters are conjunctions of field equalities. Implementations must
/// tolerate concurrent use of one client.
pub trait DocumentStore: Send + Sync {
    /// Establishes the client session.
    fn connect<'a>(&'a self, params: &'a ConnectionParams) -> BoxFuture<'a, Result<()>>;

    /// Returns the first document matching `filter`.
    fn find_one<'a>(
        &'a self,
        database: &'a str,
        collection: &'a str,
        filter: &'a Fields,
    ) -> BoxFuture<'a, Result<Option<Fields>>>;

    /// Returns the documents matching `filter` with the cursor options
    /// applied, plus the number of matches ignoring skip and limit.
    fn find<'a>(
        &'a self,
        database: &'a str,
        collection: &'a str,
        filter: &'a Fields,
        spec: &'a FindSpec,
    ) -> BoxFuture<'a, Result<(Vec<Fields>, u64)>>;

    /// Inserts a document and returns its `_id`, generating one if absent.
    fn insert_one<'a>(
        &'a self,
        database: &'a str,
        collection: &'a str,
        document: Fields,
    ) -> BoxFuture<'a, Result<Value>>;

    /// Sets `changes` on the first document matching `filter`.
    fn update_one<'a>(
        &'a self,
        database: &'a str,
        collection: &'a str,
        filter: &'a Fields,
        changes: Fields,
    ) -> BoxFuture<'a, Result<u64>>;

    /// Removes every document matching `filter`.
    fn remove<'a>(
        &'a self,
        database: &'a str,
        collection: &'a str,
        filter: &'a Fields,
    ) -> BoxFuture<'a, Result<u64>>;
}

/// Adapter over a document store driver.
pub struct DocumentBackend {
    store: Arc<dyn DocumentStore>,
    params: ConnectionParams,
    connected: AtomicBool,
}

impl fmt::Debug for DocumentBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentBackend")
            .field("params", &self.params)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl DocumentBackend {
    /// Creates an unconnected adapter.
    pub fn new(store: Arc<dyn DocumentStore>, params: ConnectionParams) -> Self {
        Self {
            store,
            params,
            connected: AtomicBool::new(false),
        }
    }

    fn database(&self) -> Result<&str> {
        self.params.database_name()
    }

    fn field_criteria<'c>(&self, criteria: &'c Criteria) -> Result<&'c Fields> {
        match criteria {
            Criteria::Fields(fields) => Ok(fields),
            Criteria::Query(_) => Err(OrmError::Configuration(String::from(
                "query templates require a relational backend",
            ))),
        }
    }
}

/// Converts `_id` to its text form.
fn normalize_ids(fields: &Fields) -> Fields {
    let mut out = fields.clone();
    if let Some(id) = out.get_mut(ID_FIELD) {
        if !id.is_null() && !matches!(id, Value::Text(_)) {
            *id = Value::Text(id.to_text());
        }
    }
    out
}

impl Adapter for DocumentBackend {
    async fn connect(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        self.store.connect(&self.params).await?;
        self.connected.store(true, Ordering::Release);
        info!(host = %self.params.host, database = ?self.params.database, "Connected to document store");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.connected.swap(false, Ordering::AcqRel) {
            info!(host = %self.params.host, "Closed document store connection");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn select_one(&self, table: &str, criteria: &Criteria) -> Result<Fields> {
        let filter = normalize_ids(self.field_criteria(criteria)?);
        self.connect().await?;
        debug!(collection = %table, ?filter, "find_one");

        self.store
            .find_one(self.database()?, table, &filter)
            .await?
            .ok_or_else(|| OrmError::NotFound {
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
        let filter = normalize_ids(self.field_criteria(criteria)?);
        self.connect().await?;

        let window = options.window();
        let sort = if options.sort.is_empty() {
            // newest first
            vec![OrderBy::desc(ID_FIELD)]
        } else {
            options.sort.clone()
        };
        let spec = FindSpec {
            skip: window.map(|(offset, _)| offset),
            limit: window.map(|(_, limit)| limit),
            sort,
        };
        debug!(collection = %table, ?filter, ?spec, "find");

        self.store.find(self.database()?, table, &filter, &spec).await
    }

    async fn insert(&self, table: &str, fields: &Fields) -> Result<Value> {
        self.connect().await?;
        debug!(collection = %table, "insert_one");
        let id = self
            .store
            .insert_one(self.database()?, table, normalize_ids(fields))
            .await?;
        Ok(Value::Text(id.to_text()))
    }

    async fn update(
        &self,
        table: &str,
        fields: &Fields,
        changes: &[String],
        key: &Fields,
    ) -> Result<u64> {
        let set: Fields = changes
            .iter()
            .filter(|name| key.get(name.as_str()) != fields.get(name.as_str()))
            .map(|name| {
                let value = fields.get(name).cloned().unwrap_or(Value::Null);
                (name.clone(), value)
            })
            .collect();
        if set.is_empty() {
            return Ok(0);
        }

        self.connect().await?;
        let filter = normalize_ids(key);
        debug!(collection = %table, ?filter, fields = ?set.keys().collect::<Vec<_>>(), "update_one");
        self.store
            .update_one(self.database()?, table, &filter, set)
            .await
    }

    async fn delete(&self, table: &str, key: &Fields) -> Result<u64> {
        self.connect().await?;
        let filter = normalize_ids(key);
        debug!(collection = %table, ?filter, "remove");
        self.store.remove(self.database()?, table, &filter).await
    }

    fn server_timestamp(&self) -> Value {
        Value::Timestamp(Utc::now().naive_utc())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryStore;
    use storm_core::fields;

    fn backend() -> DocumentBackend {
        DocumentBackend::new(Arc::new(MemoryStore::new()), ConnectionParams::new("test"))
    }

    #[tokio::test]
    async fn test_insert_then_select_one() {
        let db = backend();
        let id = db
            .insert("posts", &fields! { "title" => "hello" })
            .await
            .unwrap();
        assert!(db.is_connected());

        let row = db
            .select_one("posts", &fields! { "_id" => id.clone() }.into())
            .await
            .unwrap();
        assert_eq!(row["title"], Value::Text("hello".into()));
        assert_eq!(row["_id"], id);
    }

    #[tokio::test]
    async fn test_select_one_not_found() {
        let db = backend();
        let err = db
            .select_one("posts", &fields! { "title" => "nope" }.into())
            .await
            .unwrap_err();
        assert!(matches!(err, OrmError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_query_criteria_is_rejected() {
        let db = backend();
        let err = db
            .select_one("posts", &crate::Query::new("SELECT 1").into())
            .await
            .unwrap_err();
        assert!(matches!(err, OrmError::Configuration(_)));
        assert!(!db.is_connected());
    }

    #[tokio::test]
    async fn test_update_sets_only_changes() {
        let db = backend();
        let id = db
            .insert("posts", &fields! { "title" => "a", "views" => 1 })
            .await
            .unwrap();

        let fields = fields! { "_id" => id.clone(), "title" => "b", "views" => 99 };
        let key = fields! { "_id" => id.clone() };
        let changed = db
            .update("posts", &fields, &["title".to_string()], &key)
            .await
            .unwrap();
        assert_eq!(changed, 1);

        let row = db.select_one("posts", &key.clone().into()).await.unwrap();
        assert_eq!(row["title"], Value::Text("b".into()));
        assert_eq!(row["views"], Value::Int(1));
    }

    #[tokio::test]
    async fn test_update_without_changes_is_noop() {
        let db = backend();
        let key = fields! { "_id" => "missing" };
        assert_eq!(db.update("posts", &Fields::new(), &[], &key).await.unwrap(), 0);
        assert!(!db.is_connected());
    }

    #[tokio::test]
    async fn test_default_sort_is_newest_first() {
        let db = backend();
        for n in 0..3 {
            db.insert("events", &fields! { "n" => n }).await.unwrap();
        }
        let (rows, total) = db
            .select_multiple("events", &Criteria::all(), &FindOptions::new())
            .await
            .unwrap();
        assert_eq!(total, 3);
        let order: Vec<&Value> = rows.iter().map(|r| &r["n"]).collect();
        assert_eq!(order, [&Value::Int(2), &Value::Int(1), &Value::Int(0)]);
    }

    #[tokio::test]
    async fn test_delete_and_close() {
        let db = backend();
        let id = db.insert("posts", &fields! { "t" => 1 }).await.unwrap();
        assert_eq!(db.delete("posts", &fields! { "_id" => id }).await.unwrap(), 1);
        db.close().await.unwrap();
        assert!(!db.is_connected());
        db.close().await.unwrap();
    }
}
