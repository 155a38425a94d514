//! Entity records and the entity declaration surface.
//!
//! An entity is a plain struct that owns a [`Record`]: a field map plus the
//! log of fields changed since the record was loaded or last saved. All field
//! writes go through [`Record::set_field`], which is what keeps the log
//! accurate.

use std::slice;

use storm_core::{Fields, ToValue, Value};

use crate::error::Result;
use crate::manager::Manager;

/// Primary key declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimaryKey {
    /// A single key field.
    Simple(String),
    /// An ordered list of key fields.
    Compound(Vec<String>),
}

impl PrimaryKey {
    /// Creates a single-field key.
    pub fn simple(name: impl Into<String>) -> Self {
        Self::Simple(name.into())
    }

    /// Creates a compound key. A single name yields a simple key.
    pub fn compound<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.len() == 1 {
            Self::Simple(names.remove(0))
        } else {
            Self::Compound(names)
        }
    }

    /// Returns the key field names in order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        match self {
            Self::Simple(name) => slice::from_ref(name),
            Self::Compound(names) => names,
        }
    }

    /// Returns true if `name` is one of the key fields.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names().iter().any(|n| n == name)
    }
}

impl Default for PrimaryKey {
    fn default() -> Self {
        Self::simple("_id")
    }
}

/// Persistence state of an entity instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    /// Never loaded or saved.
    Transient,
    /// Matches the stored representation.
    Persisted,
    /// Stored, with unsaved changes.
    Dirty,
    /// Removed from the store.
    Deleted,
}

/// Field map with a changed-field log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Fields,
    changes: Vec<String>,
    /// Stored values of changed fields, as of the last load or save.
    originals: Fields,
    persisted: bool,
    deleted: bool,
}

impl Record {
    /// Creates an empty, transient record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a record from a stored row. The change log starts empty.
    #[must_use]
    pub fn from_fields(fields: Fields) -> Self {
        Self {
            fields,
            changes: Vec::new(),
            originals: Fields::new(),
            persisted: true,
            deleted: false,
        }
    }

    /// Returns a field value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Returns true if the field is present and not null.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.fields.get(name).is_some_and(|v| !v.is_null())
    }

    /// Assigns a field.
    ///
    /// If the new value differs from the current one the field is stored and
    /// its name appended to the change log (once per save cycle). Returns
    /// whether anything changed.
    pub fn set_field(&mut self, name: &str, value: impl ToValue) -> bool {
        let value = value.to_value();
        if self.fields.get(name) == Some(&value) {
            return false;
        }
        let previous = self.fields.insert(name.to_string(), value);
        if !self.is_changed(name) {
            self.changes.push(name.to_string());
            if self.persisted {
                self.originals
                    .insert(name.to_string(), previous.unwrap_or(Value::Null));
            }
        }
        true
    }

    /// Returns a field value as it was last loaded or saved.
    ///
    /// Fields not changed since then read the same as [`get`](Self::get).
    #[must_use]
    pub fn stored(&self, name: &str) -> Option<&Value> {
        self.originals.get(name).or_else(|| self.fields.get(name))
    }

    /// Returns all fields.
    #[must_use]
    pub const fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Consumes the record and returns its fields.
    #[must_use]
    pub fn into_fields(self) -> Fields {
        self.fields
    }

    /// Returns the changed-field log in assignment order.
    #[must_use]
    pub fn changes(&self) -> &[String] {
        &self.changes
    }

    /// Returns true if `name` is in the change log.
    #[must_use]
    pub fn is_changed(&self, name: &str) -> bool {
        self.changes.iter().any(|c| c == name)
    }

    /// Empties the change log. Current values become the stored ones.
    pub fn clear_changes(&mut self) {
        self.changes.clear();
        self.originals.clear();
    }

    /// Returns the persistence state.
    #[must_use]
    pub fn state(&self) -> EntityState {
        if self.deleted {
            EntityState::Deleted
        } else if !self.persisted {
            EntityState::Transient
        } else if self.changes.is_empty() {
            EntityState::Persisted
        } else {
            EntityState::Dirty
        }
    }

    /// Stores a value without logging it. Used for backend-assigned keys.
    pub(crate) fn put_untracked(&mut self, name: &str, value: Value) {
        self.fields.insert(name.to_string(), value);
    }

    pub(crate) fn mark_saved(&mut self) {
        self.clear_changes();
        self.persisted = true;
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.deleted = true;
    }
}

/// Lifecycle hooks, awaited by the manager around loads and saves.
///
/// Every method defaults to a no-op.
#[allow(async_fn_in_trait)]
pub trait EntityHooks {
    /// Runs before a write with the fields changed so far.
    async fn before_save(&mut self, _changes: &[String]) -> Result<()> {
        Ok(())
    }

    /// Runs after a successful write with the fields that were written.
    async fn after_save(&mut self, _changes: &[String]) -> Result<()> {
        Ok(())
    }

    /// Runs after a row has been converted into an entity.
    async fn after_load(&mut self) -> Result<()> {
        Ok(())
    }
}

/// An entity type mapped to one table or collection.
///
/// Usually derived:
///
/// ```ignore
/// use storm_orm::{Entity, Record};
///
/// #[derive(Debug, Default, Entity)]
/// #[entity(table = "users", primary_key = "id", json_fields("settings"))]
/// struct User {
///     record: Record,
/// }
/// ```
pub trait Entity: EntityHooks + Sized {
    /// The type name; the default table name is its lower-cased form.
    const TYPE_NAME: &'static str;

    /// Returns the table or collection name.
    fn table() -> String {
        Self::TYPE_NAME.to_lowercase()
    }

    /// Returns the primary key declaration. Defaults to `_id`.
    fn primary_key() -> PrimaryKey {
        PrimaryKey::default()
    }

    /// Returns the fields stored as JSON text.
    fn json_fields() -> &'static [&'static str] {
        &[]
    }

    /// Returns the field stamped with the server time on every update.
    fn modified_field() -> Option<&'static str> {
        None
    }

    /// Wraps a record in the entity type.
    fn from_record(record: Record) -> Self;

    /// Returns the entity's record.
    fn record(&self) -> &Record;

    /// Returns the entity's record mutably.
    fn record_mut(&mut self) -> &mut Record;

    /// Returns a manager bound to the process-wide default source.
    fn objects() -> Manager<Self> {
        Manager::new()
    }

    /// Returns a field value.
    fn get(&self, name: &str) -> Option<&Value> {
        self.record().get(name)
    }

    /// Assigns a field through the change log.
    fn set(&mut self, name: &str, value: impl ToValue) -> bool {
        self.record_mut().set_field(name, value)
    }

    /// Returns the persistence state.
    fn state(&self) -> EntityState {
        self.record().state()
    }
}
