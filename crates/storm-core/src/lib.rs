//! # storm-core
//!
//! Leaf types shared by the storm entity mapper:
//!
//! - [`Value`] and [`Fields`], the dynamic field representation used by
//!   entity records and by every backend
//! - [`Dialect`] implementations that render values as SQL literals
//!
//! ```
//! use storm_core::{Dialect, SqliteDialect, Value};
//!
//! let dialect = SqliteDialect::new();
//! assert_eq!(dialect.quote(&Value::Text("it's".into())), "'it''s'");
//! assert_eq!(dialect.quote(&Value::Int(5)), "5");
//! ```

pub mod dialect;
mod value;

pub use dialect::{Dialect, MySqlDialect, SqliteDialect, NOW};
pub use value::{Fields, ToValue, Value, TIMESTAMP_FORMAT};
