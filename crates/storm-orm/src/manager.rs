//! Entity manager: load, save and delete entities through a source.
//!
//! A [`Manager`] is bound to a [`Source`], either a single backend or a
//! connection pool. `Manager::new()` (and `Entity::objects()`) read the
//! process-wide default set with [`set_default_source`]; [`Manager::using`]
//! takes the source explicitly.

use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};

use storm_core::{Fields, Value};
use tracing::{debug, info, warn};

use crate::backend::{
    Adapter, Backend, Criteria, DocumentBackend, FindOptions, RelationalBackend,
};
use crate::collection::Collection;
use crate::entity::{Entity, PrimaryKey, Record};
use crate::error::{OrmError, Result};
use crate::pool::ConnectionPool;

/// Where a manager gets its connections.
#[derive(Debug, Clone)]
pub enum Source {
    /// One shared backend connection.
    Backend(Arc<Backend>),
    /// A pool; every operation acquires a connection first.
    Pool(Arc<ConnectionPool>),
}

impl Source {
    /// Returns a connection handle.
    pub async fn acquire(&self) -> Result<Arc<Backend>> {
        match self {
            Self::Backend(backend) => Ok(Arc::clone(backend)),
            Self::Pool(pool) => pool.acquire().await,
        }
    }
}

impl From<Backend> for Source {
    fn from(backend: Backend) -> Self {
        Self::Backend(Arc::new(backend))
    }
}

impl From<Arc<Backend>> for Source {
    fn from(backend: Arc<Backend>) -> Self {
        Self::Backend(backend)
    }
}

impl From<RelationalBackend> for Source {
    fn from(backend: RelationalBackend) -> Self {
        Backend::from(backend).into()
    }
}

impl From<DocumentBackend> for Source {
    fn from(backend: DocumentBackend) -> Self {
        Backend::from(backend).into()
    }
}

impl From<ConnectionPool> for Source {
    fn from(pool: ConnectionPool) -> Self {
        Self::Pool(Arc::new(pool))
    }
}

impl From<Arc<ConnectionPool>> for Source {
    fn from(pool: Arc<ConnectionPool>) -> Self {
        Self::Pool(pool)
    }
}

static DEFAULT_SOURCE: OnceLock<Source> = OnceLock::new();

/// Sets the process-wide default source. It can be set only once.
pub fn set_default_source(source: impl Into<Source>) -> Result<()> {
    DEFAULT_SOURCE
        .set(source.into())
        .map_err(|_| OrmError::Configuration(String::from("default source is already set")))?;
    info!("Default source configured");
    Ok(())
}

/// Returns the process-wide default source, if one was set.
#[must_use]
pub fn default_source() -> Option<Source> {
    DEFAULT_SOURCE.get().cloned()
}

/// Which write path `save` took.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// The entity was inserted; carries its identifier.
    Inserted(Value),
    /// The entity was updated; carries the number of rows affected.
    Updated(u64),
}

/// Database access for one entity type.
///
/// # Example
///
/// ```ignore
/// let post = Post::objects().find(fields! { "_id" => id }).await?;
/// let page = Post::objects()
///     .find_all(Criteria::all(), &FindOptions::new().page(2))
///     .await?;
/// ```
#[derive(Debug)]
pub struct Manager<E> {
    source: Option<Source>,
    _marker: PhantomData<E>,
}

impl<E> Clone for Manager<E> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            _marker: PhantomData,
        }
    }
}

impl<E: Entity> Default for Manager<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> Manager<E> {
    /// Creates a manager bound to the default source.
    ///
    /// Operations fail with a configuration error if no default is set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            source: default_source(),
            _marker: PhantomData,
        }
    }

    /// Creates a manager bound to `source`.
    #[must_use]
    pub fn using(source: impl Into<Source>) -> Self {
        Self {
            source: Some(source.into()),
            _marker: PhantomData,
        }
    }

    async fn connection(&self) -> Result<Arc<Backend>> {
        match &self.source {
            Some(source) => source.acquire().await,
            None => Err(OrmError::Configuration(String::from(
                "no source configured; call set_default_source or Manager::using",
            ))),
        }
    }

    /// Loads exactly one entity.
    pub async fn find(&self, criteria: impl Into<Criteria>) -> Result<E> {
        let criteria = criteria.into();
        let backend = self.connection().await?;
        let row = backend.select_one(&E::table(), &criteria).await?;
        load(&backend, row).await
    }

    /// Loads every matching entity.
    ///
    /// Page metadata is attached only when `options.page` is set.
    pub async fn find_all(
        &self,
        criteria: impl Into<Criteria>,
        options: &FindOptions,
    ) -> Result<Collection<E>> {
        let criteria = criteria.into();
        let backend = self.connection().await?;
        let (rows, total) = backend
            .select_multiple(&E::table(), &criteria, options)
            .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(load(&backend, row).await?);
        }
        Ok(Collection::with_options(items, total, options))
    }

    /// Like [`find_all`](Self::find_all), but returns the raw rows.
    pub async fn find_all_raw(
        &self,
        criteria: impl Into<Criteria>,
        options: &FindOptions,
    ) -> Result<Collection<Fields>> {
        let criteria = criteria.into();
        let backend = self.connection().await?;
        let (rows, total) = backend
            .select_multiple(&E::table(), &criteria, options)
            .await?;
        Ok(Collection::with_options(rows, total, options))
    }

    /// Inserts or updates the entity.
    ///
    /// A simple key that is unset or was assigned since the last save means
    /// insert; a compound key means insert only if every component was
    /// assigned since the last save. Everything else is an update.
    pub async fn save(&self, entity: &mut E) -> Result<SaveOutcome> {
        if is_new::<E>(entity.record()) {
            self.insert(entity).await.map(SaveOutcome::Inserted)
        } else {
            self.update(entity).await.map(SaveOutcome::Updated)
        }
    }

    /// Inserts the entity and returns its identifier.
    ///
    /// A backend-generated identifier is stored in an unset simple key field.
    pub async fn insert(&self, entity: &mut E) -> Result<Value> {
        let backend = self.connection().await?;
        let table = E::table();

        let pending = entity.record().changes().to_vec();
        entity.before_save(&pending).await?;

        let written = entity.record().changes().to_vec();
        let fields = encode_json_fields::<E>(entity.record().fields());
        let generated = backend.insert(&table, &fields).await?;

        let id = match E::primary_key() {
            PrimaryKey::Simple(name) => match entity.record().get(&name) {
                Some(existing) if !existing.is_null() => existing.clone(),
                _ => {
                    let id = if backend.is_document() {
                        Value::Text(generated.to_text())
                    } else {
                        generated
                    };
                    entity.record_mut().put_untracked(&name, id.clone());
                    id
                }
            },
            PrimaryKey::Compound(_) => generated,
        };
        debug!(table = %table, id = %id, "Inserted entity");

        entity.after_save(&written).await?;
        entity.record_mut().mark_saved();
        Ok(id)
    }

    /// Writes the changed fields of the entity and returns the number of rows
    /// affected. Nothing is written when no field changed.
    ///
    /// The row is matched on the key as last loaded or saved, so changed key
    /// components are written like any other field.
    pub async fn update(&self, entity: &mut E) -> Result<u64> {
        let key = key_fields::<E>(entity.record())?;
        let backend = self.connection().await?;
        let table = E::table();

        let pending = entity.record().changes().to_vec();
        entity.before_save(&pending).await?;

        let mut written = entity.record().changes().to_vec();
        let mut fields = encode_json_fields::<E>(entity.record().fields());
        if let (Some(stamp), false) = (E::modified_field(), written.is_empty()) {
            let now = backend.server_timestamp();
            if backend.is_document() {
                entity.record_mut().put_untracked(stamp, now.clone());
            }
            fields.insert(stamp.to_string(), now);
            if !written.iter().any(|name| name == stamp) {
                written.push(stamp.to_string());
            }
        }

        let affected = backend.update(&table, &fields, &written, &key).await?;
        debug!(table = %table, affected, fields = ?written, "Updated entity");

        entity.after_save(&written).await?;
        entity.record_mut().mark_saved();
        Ok(affected)
    }

    /// Deletes the entity.
    ///
    /// Returns `false` without touching the backend if the key is unset, and
    /// otherwise whether a row was removed.
    pub async fn delete(&self, entity: &mut E) -> Result<bool> {
        let pk = E::primary_key();
        if !pk.names().iter().any(|name| entity.record().has(name)) {
            return Ok(false);
        }
        let key = key_fields::<E>(entity.record())?;
        let backend = self.connection().await?;

        let removed = backend.delete(&E::table(), &key).await? > 0;
        if removed {
            entity.record_mut().mark_deleted();
        }
        Ok(removed)
    }
}

/// Converts a stored row into an entity and runs `after_load`.
async fn load<E: Entity>(backend: &Backend, mut row: Fields) -> Result<E> {
    decode_json_fields::<E>(&mut row);
    if backend.is_document() {
        if let PrimaryKey::Simple(name) = E::primary_key() {
            if let Some(id) = row.get_mut(&name) {
                if !id.is_null() && id.as_str().is_none() {
                    *id = Value::Text(id.to_text());
                }
            }
        }
    }

    let mut entity = E::from_record(Record::from_fields(row));
    entity.after_load().await?;
    entity.record_mut().clear_changes();
    Ok(entity)
}

fn is_new<E: Entity>(record: &Record) -> bool {
    match E::primary_key() {
        PrimaryKey::Simple(name) => !record.has(&name) || record.is_changed(&name),
        PrimaryKey::Compound(names) => names.iter().all(|name| record.is_changed(name)),
    }
}

/// Collects the stored key values; every component must be set.
fn key_fields<E: Entity>(record: &Record) -> Result<Fields> {
    let pk = E::primary_key();
    let mut key = Fields::new();
    for name in pk.names() {
        match record.stored(name) {
            Some(value) if !value.is_null() => {
                key.insert(name.clone(), value.clone());
            }
            _ => {
                return Err(OrmError::Constraint(format!(
                    "{} has no value for key field `{name}`",
                    E::TYPE_NAME
                )))
            }
        }
    }
    Ok(key)
}

/// Serializes JSON fields to text for storage.
fn encode_json_fields<E: Entity>(fields: &Fields) -> Fields {
    let mut out = fields.clone();
    for &name in E::json_fields() {
        let Some(value) = out.get_mut(name) else {
            continue;
        };
        if value.is_null() || value.as_str().is_some() {
            continue;
        }
        let text = match &*value {
            Value::Json(json) => serde_json::to_string(json),
            other => serde_json::to_string(other),
        };
        *value = Value::Text(text.unwrap_or_else(|e| {
            warn!(field = name, error = %e, "Could not serialize JSON field, storing empty object");
            String::from("{}")
        }));
    }
    out
}

/// Parses JSON fields loaded as text.
fn decode_json_fields<E: Entity>(row: &mut Fields) {
    for &name in E::json_fields() {
        let Some(value) = row.get_mut(name) else {
            continue;
        };
        let Some(text) = value.as_str() else {
            continue;
        };
        let parsed = serde_json::from_str(text).unwrap_or_else(|e| {
            warn!(field = name, error = %e, "Could not parse JSON field, using empty object");
            serde_json::Value::Object(serde_json::Map::new())
        });
        *value = Value::Json(parsed);
    }
}
