//! # storm-orm
//!
//! A small async entity mapper over document and relational stores.
//!
//! This crate provides:
//! - `Entity` trait (usually derived) for types backed by a change-tracked
//!   [`Record`]
//! - `Manager` for loading, saving and deleting entities
//! - `ConnectionPool` with random selection and lifetime recycling
//! - `Query` templates with named placeholders and post-fetch `Filter`s
//! - `Collection` results with pagination metadata
//!
//! ## Quick Start
//!
//! ```ignore
//! use storm_orm::{fields, set_default_source, Entity, FindOptions, Record, RelationalBackend};
//! use storm_orm::ConnectionParams;
//!
//! #[derive(Debug, Default, Entity)]
//! #[entity(table = "posts", primary_key = "id", modified = "modified_on")]
//! struct Post {
//!     record: Record,
//! }
//!
//! async fn example() -> storm_orm::Result<()> {
//!     set_default_source(RelationalBackend::new(ConnectionParams::new("app.db")))?;
//!
//!     let mut post = Post::default();
//!     post.set("title", "hello");
//!     Post::objects().save(&mut post).await?;
//!
//!     let page = Post::objects()
//!         .find_all(fields! { "status" => "open" }, &FindOptions::new().page(1).sort("-id"))
//!         .await?;
//!     println!("{} of {}", page.len(), page.total_count());
//!     Ok(())
//! }
//! ```
//!
//! ## Query Templates
//!
//! ```ignore
//! use storm_orm::{Filter, Query};
//!
//! let query = Query::new("SELECT * FROM {table} WHERE author = {author}")
//!     .bind("author", "ann")
//!     .filter(Filter::gt("score", 50));
//! let posts = Post::objects().find_all(query, &FindOptions::new()).await?;
//! ```

pub mod backend;
mod collection;
mod config;
mod entity;
mod error;
mod manager;
mod pool;
pub mod query;

pub use backend::{
    Adapter, Backend, BackendKind, Criteria, DocumentBackend, DocumentStore, FindOptions,
    FindSpec, MemoryStore, RelationalBackend,
};
pub use collection::Collection;
pub use config::{ConnectionParams, PoolSettings};
pub use entity::{Entity, EntityHooks, EntityState, PrimaryKey, Record};
pub use error::{OrmError, Result};
pub use manager::{default_source, set_default_source, Manager, SaveOutcome, Source};
pub use pool::{ConnectionPool, ConnectionPoolBuilder};
pub use query::{Comparator, Filter, OrderBy, OrderDirection, Query};

/// Derives [`Entity`] and, unless `hooks` is given, an empty [`EntityHooks`].
pub use storm_derive::Entity;

// Re-export the value types from storm-core
pub use storm_core::{fields, Dialect, Fields, MySqlDialect, SqliteDialect, ToValue, Value, NOW};
