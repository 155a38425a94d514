//! In-memory document store.
//!
//! Keeps every collection as a vector of documents behind a lock. Suitable
//! for tests and ephemeral data; nothing is persisted.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::future::ready;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
use std::sync::{OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use futures::future::BoxFuture;
use rand::RngExt;
use storm_core::{Fields, Value};

use super::document::{DocumentStore, FindSpec, ID_FIELD};
use crate::config::ConnectionParams;
use crate::error::{OrmError, Result};
use crate::query::OrderDirection;

type Collections = BTreeMap<String, Vec<Fields>>;

/// A [`DocumentStore`] held entirely in memory.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use storm_orm::{BackendKind, MemoryStore};
///
/// let kind = BackendKind::Document(Arc::new(MemoryStore::new()));
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<Collections>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of documents in a collection.
    pub fn count(&self, database: &str, collection: &str) -> Result<usize> {
        Ok(self
            .read()?
            .get(&namespace(database, collection))
            .map_or(0, Vec::len))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Collections>> {
        self.collections
            .read()
            .map_err(|_| OrmError::Driver(String::from("memory store lock poisoned")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Collections>> {
        self.collections
            .write()
            .map_err(|_| OrmError::Driver(String::from("memory store lock poisoned")))
    }

    fn find_one_now(&self, database: &str, collection: &str, filter: &Fields) -> Result<Option<Fields>> {
        let collections = self.read()?;
        Ok(collections
            .get(&namespace(database, collection))
            .and_then(|docs| docs.iter().find(|doc| doc_matches(doc, filter)))
            .cloned())
    }

    fn find_now(
        &self,
        database: &str,
        collection: &str,
        filter: &Fields,
        spec: &FindSpec,
    ) -> Result<(Vec<Fields>, u64)> {
        let collections = self.read()?;
        let mut docs: Vec<Fields> = collections
            .get(&namespace(database, collection))
            .map(|docs| docs.iter().filter(|doc| doc_matches(doc, filter)).cloned().collect())
            .unwrap_or_default();
        drop(collections);

        let total = docs.len() as u64;
        // Stable sort, so the last key is applied first.
        for order in spec.sort.iter().rev() {
            docs.sort_by(|a, b| {
                let left = a.get(&order.field).unwrap_or(&Value::Null);
                let right = b.get(&order.field).unwrap_or(&Value::Null);
                let ordering = left.compare(right).unwrap_or(Ordering::Equal);
                match order.direction {
                    OrderDirection::Asc => ordering,
                    OrderDirection::Desc => ordering.reverse(),
                }
            });
        }

        let skip = usize::try_from(spec.skip.unwrap_or(0)).unwrap_or(usize::MAX);
        let limit = spec
            .limit
            .map_or(usize::MAX, |n| usize::try_from(n).unwrap_or(usize::MAX));
        let page = docs.into_iter().skip(skip).take(limit).collect();
        Ok((page, total))
    }

    fn insert_now(&self, database: &str, collection: &str, mut document: Fields) -> Result<Value> {
        let id = match document.get(ID_FIELD) {
            Some(id) if !id.is_null() => id.clone(),
            _ => {
                let id = Value::Text(object_id());
                document.insert(ID_FIELD.to_string(), id.clone());
                id
            }
        };

        let mut collections = self.write()?;
        let docs = collections
            .entry(namespace(database, collection))
            .or_default();
        if docs
            .iter()
            .any(|doc| doc.get(ID_FIELD).is_some_and(|existing| existing.loose_eq(&id)))
        {
            return Err(OrmError::Driver(format!("duplicate key {ID_FIELD}: {id}")));
        }
        docs.push(document);
        Ok(id)
    }

    fn update_now(
        &self,
        database: &str,
        collection: &str,
        filter: &Fields,
        changes: Fields,
    ) -> Result<u64> {
        let mut collections = self.write()?;
        let Some(doc) = collections
            .get_mut(&namespace(database, collection))
            .and_then(|docs| docs.iter_mut().find(|doc| doc_matches(doc, filter)))
        else {
            return Ok(0);
        };
        doc.extend(changes);
        Ok(1)
    }

    fn remove_now(&self, database: &str, collection: &str, filter: &Fields) -> Result<u64> {
        let mut collections = self.write()?;
        let Some(docs) = collections.get_mut(&namespace(database, collection)) else {
            return Ok(0);
        };
        let before = docs.len();
        docs.retain(|doc| !doc_matches(doc, filter));
        Ok((before - docs.len()) as u64)
    }
}

impl DocumentStore for MemoryStore {
    fn connect<'a>(&'a self, _params: &'a ConnectionParams) -> BoxFuture<'a, Result<()>> {
        Box::pin(ready(Ok(())))
    }

    fn find_one<'a>(
        &'a self,
        database: &'a str,
        collection: &'a str,
        filter: &'a Fields,
    ) -> BoxFuture<'a, Result<Option<Fields>>> {
        Box::pin(ready(self.find_one_now(database, collection, filter)))
    }

    fn find<'a>(
        &'a self,
        database: &'a str,
        collection: &'a str,
        filter: &'a Fields,
        spec: &'a FindSpec,
    ) -> BoxFuture<'a, Result<(Vec<Fields>, u64)>> {
        Box::pin(ready(self.find_now(database, collection, filter, spec)))
    }

    fn insert_one<'a>(
        &'a self,
        database: &'a str,
        collection: &'a str,
        document: Fields,
    ) -> BoxFuture<'a, Result<Value>> {
        Box::pin(ready(self.insert_now(database, collection, document)))
    }

    fn update_one<'a>(
        &'a self,
        database: &'a str,
        collection: &'a str,
        filter: &'a Fields,
        changes: Fields,
    ) -> BoxFuture<'a, Result<u64>> {
        Box::pin(ready(self.update_now(database, collection, filter, changes)))
    }

    fn remove<'a>(
        &'a self,
        database: &'a str,
        collection: &'a str,
        filter: &'a Fields,
    ) -> BoxFuture<'a, Result<u64>> {
        Box::pin(ready(self.remove_now(database, collection, filter)))
    }
}

fn namespace(database: &str, collection: &str) -> String {
    format!("{database}.{collection}")
}

fn doc_matches(doc: &Fields, filter: &Fields) -> bool {
    filter.iter().all(|(name, expected)| {
        doc.get(name)
            .unwrap_or(&Value::Null)
            .loose_eq(expected)
    })
}

/// Generates a 24-digit hex identifier: seconds since the epoch, a
/// per-process random tag and a counter.
fn object_id() -> String {
    static PROCESS: OnceLock<[u8; 5]> = OnceLock::new();
    static COUNTER: OnceLock<AtomicU32> = OnceLock::new();

    let process = PROCESS.get_or_init(|| {
        let mut bytes = [0u8; 5];
        rand::rng().fill(&mut bytes);
        bytes
    });
    let counter = COUNTER
        .get_or_init(|| AtomicU32::new(rand::rng().random()))
        .fetch_add(1, AtomicOrdering::Relaxed);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let seconds = Utc::now().timestamp() as u32;

    let mut bytes = [0u8; 12];
    bytes[..4].copy_from_slice(&seconds.to_be_bytes());
    bytes[4..9].copy_from_slice(process);
    bytes[9..].copy_from_slice(&counter.to_be_bytes()[1..]);

    bytes.iter().fold(String::with_capacity(24), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}
