//! Query building types for relational backends.
//!
//! This module provides the [`Query`] template, post-fetch [`Filter`]s and
//! sort specifications.

mod filter;
mod order;
mod template;

pub use filter::{apply_filters, Comparator, Filter, Operand};
pub use order::{OrderBy, OrderDirection};
pub use template::Query;

pub(crate) use template::count_query;
