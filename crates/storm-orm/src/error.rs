//! Error types for the ORM.

use thiserror::Error;

/// ORM-specific errors.
#[derive(Debug, Error)]
pub enum OrmError {
    /// Backend, pool or default source misconfigured.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No row or document matched.
    #[error("object of type {table} not found with criteria {criteria}")]
    NotFound {
        /// Table or collection that was searched.
        table: String,
        /// Rendered criteria.
        criteria: String,
    },

    /// The caller asked for something the entity or query state forbids.
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// Relational driver error, passed through unchanged.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Document driver error, passed through unchanged.
    #[error("document store error: {0}")]
    Driver(String),

    /// Query template error.
    #[error("query error: {0}")]
    Query(String),
}

/// Result type alias for ORM operations.
pub type Result<T> = std::result::Result<T, OrmError>;
