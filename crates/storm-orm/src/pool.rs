//! Randomized connection pool with lifetime recycling.
//!
//! The pool grows to `count` connections, then hands out a uniformly random
//! existing one on every acquire. Connections older than `lifetime` are
//! replaced when picked. Handles are shared: many callers may hold the same
//! connection at once.

use std::sync::Arc;

use rand::RngExt;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::backend::{Adapter, Backend, BackendKind};
use crate::config::PoolSettings;
use crate::error::{OrmError, Result};

#[derive(Debug)]
struct PoolEntry {
    backend: Arc<Backend>,
    created_at: Instant,
}

impl PoolEntry {
    fn new(backend: Backend) -> Self {
        Self {
            backend: Arc::new(backend),
            created_at: Instant::now(),
        }
    }
}

/// Builder for [`ConnectionPool`].
#[derive(Debug)]
pub struct ConnectionPoolBuilder {
    settings: PoolSettings,
    kind: Option<BackendKind>,
}

impl ConnectionPoolBuilder {
    /// Sets the backend variant every connection instantiates.
    #[must_use]
    pub fn backend(mut self, kind: BackendKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Builds the pool. No connection is opened yet.
    pub fn build(self) -> Result<ConnectionPool> {
        let kind = self
            .kind
            .ok_or_else(|| OrmError::Configuration(String::from("pool has no backend kind")))?;
        if self.settings.count == 0 {
            return Err(OrmError::Configuration(String::from(
                "pool count must be at least 1",
            )));
        }
        Ok(ConnectionPool {
            settings: self.settings,
            kind,
            entries: Mutex::new(Vec::new()),
        })
    }
}

/// A bounded set of shared backend connections.
#[derive(Debug)]
pub struct ConnectionPool {
    settings: PoolSettings,
    kind: BackendKind,
    entries: Mutex<Vec<PoolEntry>>,
}

impl ConnectionPool {
    /// Starts building a pool with the given settings.
    #[must_use]
    pub const fn builder(settings: PoolSettings) -> ConnectionPoolBuilder {
        ConnectionPoolBuilder {
            settings,
            kind: None,
        }
    }

    /// Returns the pool settings.
    #[must_use]
    pub const fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// Returns the number of live connections.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Returns true if no connection has been created yet.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Returns a connection handle.
    ///
    /// New connections are created until the pool holds `count`; after that a
    /// random existing one is returned, replaced first if it has outlived the
    /// configured lifetime. Replaced connections are closed after the pool
    /// lock is released.
    pub async fn acquire(&self) -> Result<Arc<Backend>> {
        let mut entries = self.entries.lock().await;

        if entries.len() < self.settings.count {
            let entry = PoolEntry::new(self.open());
            let backend = Arc::clone(&entry.backend);
            entries.push(entry);
            debug!(size = entries.len(), "Created pooled connection");
            return Ok(backend);
        }

        let index = rand::rng().random_range(0..entries.len());
        if entries[index].created_at.elapsed() <= self.settings.lifetime_duration() {
            return Ok(Arc::clone(&entries[index].backend));
        }

        let expired = entries.swap_remove(index);
        let entry = PoolEntry::new(self.open());
        let backend = Arc::clone(&entry.backend);
        entries.push(entry);
        drop(entries);

        debug!(
            lifetime = self.settings.lifetime,
            "Recycled expired pooled connection"
        );
        if let Err(e) = expired.backend.close().await {
            warn!(error = %e, "Failed to close expired connection");
        }
        Ok(backend)
    }

    /// Closes and removes every connection.
    pub async fn close_all(&self) -> Result<()> {
        let entries: Vec<PoolEntry> = self.entries.lock().await.drain(..).collect();
        debug!(count = entries.len(), "Closing pooled connections");
        for entry in entries {
            entry.backend.close().await?;
        }
        Ok(())
    }

    fn open(&self) -> Backend {
        Backend::open(&self.kind, &self.settings.connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryStore;
    use crate::config::ConnectionParams;
    use std::time::Duration;

    fn document_pool(count: usize, lifetime: u64) -> ConnectionPool {
        let settings = PoolSettings::new(ConnectionParams::new("test"))
            .count(count)
            .lifetime(lifetime);
        ConnectionPool::builder(settings)
            .backend(BackendKind::Document(Arc::new(MemoryStore::new())))
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_without_kind_fails() {
        let err = ConnectionPool::builder(PoolSettings::default())
            .build()
            .unwrap_err();
        assert!(matches!(err, OrmError::Configuration(_)));
    }

    #[test]
    fn test_build_with_zero_count_fails() {
        let err = ConnectionPool::builder(PoolSettings::default().count(0))
            .backend(BackendKind::Relational)
            .build()
            .unwrap_err();
        assert!(matches!(err, OrmError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_grows_to_count_then_reuses() {
        let pool = document_pool(2, 3600);
        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(pool.len().await, 2);

        let c = pool.acquire().await.unwrap();
        assert!(Arc::ptr_eq(&c, &a) || Arc::ptr_eq(&c, &b));
        assert_eq!(pool.len().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_connection_is_replaced() {
        let pool = document_pool(1, 60);
        let first = pool.acquire().await.unwrap();
        first.connect().await.unwrap();

        tokio::time::advance(Duration::from_secs(30)).await;
        let same = pool.acquire().await.unwrap();
        assert!(Arc::ptr_eq(&first, &same));

        tokio::time::advance(Duration::from_secs(31)).await;
        let fresh = pool.acquire().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &fresh));
        assert!(!first.is_connected());
        assert_eq!(pool.len().await, 1);
    }

    #[tokio::test]
    async fn test_close_all_empties_pool() {
        let pool = document_pool(3, 3600);
        for _ in 0..3 {
            pool.acquire().await.unwrap().connect().await.unwrap();
        }
        pool.close_all().await.unwrap();
        assert!(pool.is_empty().await);
    }
}
