//! Backend adapters.
//!
//! Every store is reached through the [`Adapter`] capability contract. The
//! concrete variant is picked at configuration time through [`BackendKind`]
//! and carried as the tagged [`Backend`] enum.

mod document;
mod memory;
mod relational;

use std::fmt;
use std::sync::Arc;

use storm_core::{Fields, Value};

pub use document::{DocumentBackend, DocumentStore, FindSpec};
pub use memory::MemoryStore;
pub use relational::RelationalBackend;

use crate::config::ConnectionParams;
use crate::error::Result;
use crate::query::{OrderBy, Query};

/// What to match when selecting.
#[derive(Debug, Clone, PartialEq)]
pub enum Criteria {
    /// Conjunction of field equalities. Empty matches everything.
    Fields(Fields),
    /// A query template. Relational backends only.
    Query(Query),
}

impl Criteria {
    /// Criteria matching every row.
    #[must_use]
    pub fn all() -> Self {
        Self::Fields(Fields::new())
    }
}

impl From<Fields> for Criteria {
    fn from(fields: Fields) -> Self {
        Self::Fields(fields)
    }
}

impl From<Query> for Criteria {
    fn from(query: Query) -> Self {
        Self::Query(query)
    }
}

impl fmt::Display for Criteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fields(fields) => {
                let pairs: Vec<String> = fields.iter().map(|(k, v)| format!("{k}={v}")).collect();
                write!(f, "{{{}}}", pairs.join(", "))
            }
            Self::Query(query) => write!(f, "{}", query.template()),
        }
    }
}

/// Options for multi-row selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindOptions {
    /// 1-based page number; no pagination when absent.
    pub page: Option<u32>,
    /// Rows per page.
    pub page_size: u32,
    /// Sort specification.
    pub sort: Vec<OrderBy>,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            page: None,
            page_size: 10,
            sort: Vec::new(),
        }
    }
}

impl FindOptions {
    /// Creates default options: no page, page size 10, backend sort.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a page.
    #[must_use]
    pub const fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    /// Sets the page size.
    #[must_use]
    pub const fn page_size(mut self, size: u32) -> Self {
        self.page_size = size;
        self
    }

    /// Appends a sort key; prefix with `-` for descending.
    #[must_use]
    pub fn sort(mut self, spec: &str) -> Self {
        self.sort.push(OrderBy::parse(spec));
        self
    }

    /// Returns `(offset, limit)` for the requested page.
    #[must_use]
    pub fn window(&self) -> Option<(u64, u64)> {
        self.page.map(|page| {
            let size = u64::from(self.page_size);
            (u64::from(page.saturating_sub(1)) * size, size)
        })
    }
}

/// The capability contract every store implements.
///
/// `connect` is idempotent and cheap once connected; every I/O method calls
/// it first.
#[allow(async_fn_in_trait)]
pub trait Adapter {
    /// Opens the underlying connection if needed.
    async fn connect(&self) -> Result<()>;

    /// Closes the underlying connection if open.
    async fn close(&self) -> Result<()>;

    /// Returns whether the connection is open.
    fn is_connected(&self) -> bool;

    /// Returns exactly one row, or `NotFound`.
    async fn select_one(&self, table: &str, criteria: &Criteria) -> Result<Fields>;

    /// Returns the matching rows and the total match count (before
    /// pagination, after filtering).
    async fn select_multiple(
        &self,
        table: &str,
        criteria: &Criteria,
        options: &FindOptions,
    ) -> Result<(Vec<Fields>, u64)>;

    /// Inserts a row and returns the generated identifier.
    async fn insert(&self, table: &str, fields: &Fields) -> Result<Value>;

    /// Writes the `changes` subset of `fields` to the row matching `key`.
    /// Key fields are written only when their new value differs from `key`.
    /// Returns the number of rows affected; an empty `changes` is a no-op.
    async fn update(&self, table: &str, fields: &Fields, changes: &[String], key: &Fields)
        -> Result<u64>;

    /// Deletes rows matching every key field. Returns the number removed.
    async fn delete(&self, table: &str, key: &Fields) -> Result<u64>;

    /// Value that stores as the server's current time.
    fn server_timestamp(&self) -> Value;
}

/// Which adapter a pool or default source instantiates.
#[derive(Clone)]
pub enum BackendKind {
    /// Document store reached through the given driver client.
    Document(Arc<dyn DocumentStore>),
    /// Relational store (SQLite through sqlx).
    Relational,
}

impl fmt::Debug for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document(_) => f.write_str("Document"),
            Self::Relational => f.write_str("Relational"),
        }
    }
}

/// A backend connection.
#[derive(Debug)]
pub enum Backend {
    /// Document store connection.
    Document(DocumentBackend),
    /// Relational store connection.
    Relational(RelationalBackend),
}

impl Backend {
    /// Creates an unconnected backend of the given kind.
    #[must_use]
    pub fn open(kind: &BackendKind, params: &ConnectionParams) -> Self {
        match kind {
            BackendKind::Document(store) => {
                Self::Document(DocumentBackend::new(Arc::clone(store), params.clone()))
            }
            BackendKind::Relational => Self::Relational(RelationalBackend::new(params.clone())),
        }
    }

    /// Returns true for document stores, whose identifiers are strings.
    #[must_use]
    pub const fn is_document(&self) -> bool {
        matches!(self, Self::Document(_))
    }
}

impl From<DocumentBackend> for Backend {
    fn from(backend: DocumentBackend) -> Self {
        Self::Document(backend)
    }
}

impl From<RelationalBackend> for Backend {
    fn from(backend: RelationalBackend) -> Self {
        Self::Relational(backend)
    }
}

impl Adapter for Backend {
    async fn connect(&self) -> Result<()> {
        match self {
            Self::Document(b) => b.connect().await,
            Self::Relational(b) => b.connect().await,
        }
    }

    async fn close(&self) -> Result<()> {
        match self {
            Self::Document(b) => b.close().await,
            Self::Relational(b) => b.close().await,
        }
    }

    fn is_connected(&self) -> bool {
        match self {
            Self::Document(b) => b.is_connected(),
            Self::Relational(b) => b.is_connected(),
        }
    }

    async fn select_one(&self, table: &str, criteria: &Criteria) -> Result<Fields> {
        match self {
            Self::Document(b) => b.select_one(table, criteria).await,
            Self::Relational(b) => b.select_one(table, criteria).await,
        }
    }

    async fn select_multiple(
        &self,
        table: &str,
        criteria: &Criteria,
        options: &FindOptions,
    ) -> Result<(Vec<Fields>, u64)> {
        match self {
            Self::Document(b) => b.select_multiple(table, criteria, options).await,
            Self::Relational(b) => b.select_multiple(table, criteria, options).await,
        }
    }

    async fn insert(&self, table: &str, fields: &Fields) -> Result<Value> {
        match self {
            Self::Document(b) => b.insert(table, fields).await,
            Self::Relational(b) => b.insert(table, fields).await,
        }
    }

    async fn update(
        &self,
        table: &str,
        fields: &Fields,
        changes: &[String],
        key: &Fields,
    ) -> Result<u64> {
        match self {
            Self::Document(b) => b.update(table, fields, changes, key).await,
            Self::Relational(b) => b.update(table, fields, changes, key).await,
        }
    }

    async fn delete(&self, table: &str, key: &Fields) -> Result<u64> {
        match self {
            Self::Document(b) => b.delete(table, key).await,
            Self::Relational(b) => b.delete(table, key).await,
        }
    }

    fn server_timestamp(&self) -> Value {
        match self {
            Self::Document(b) => b.server_timestamp(),
            Self::Relational(b) => b.server_timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storm_core::fields;

    #[test]
    fn test_window() {
        assert_eq!(FindOptions::new().window(), None);
        assert_eq!(FindOptions::new().page(1).window(), Some((0, 10)));
        assert_eq!(FindOptions::new().page(3).page_size(7).window(), Some((14, 7)));
    }

    #[test]
    fn test_criteria_display() {
        let criteria = Criteria::from(fields! { "a" => 1, "b" => "x" });
        assert_eq!(criteria.to_string(), "{a=1, b=x}");
    }

    #[test]
    fn test_open_picks_variant() {
        let params = ConnectionParams::new(":memory:");
        let doc = Backend::open(&BackendKind::Document(Arc::new(MemoryStore::new())), &params);
        assert!(doc.is_document());
        let rel = Backend::open(&BackendKind::Relational, &params);
        assert!(!rel.is_document());
        assert!(!rel.is_connected());
    }
}
