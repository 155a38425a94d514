//! Parameterized SQL templates.
//!
//! A [`Query`] is SQL text with `{name}` placeholders. `{table}` resolves to
//! the target table; every other placeholder resolves to the quoted literal
//! bound under that name. Resolution is a single left-to-right pass, so text
//! produced by a substitution is never scanned again.

use storm_core::{Dialect, Fields, ToValue};

use crate::error::{OrmError, Result};
use crate::query::filter::Filter;

/// Placeholder that resolves to the target table.
const TABLE_PLACEHOLDER: &str = "table";

/// A SQL template with bindings, optional pagination and post-fetch filters.
///
/// # Example
///
/// ```
/// use storm_core::SqliteDialect;
/// use storm_orm::Query;
///
/// let query = Query::new("SELECT * FROM {table} WHERE status = {status}")
///     .bind("status", "active")
///     .limit(10);
/// let sql = query.to_sql("posts", &SqliteDialect::new()).unwrap();
/// assert_eq!(sql, "SELECT * FROM \"posts\" WHERE status = 'active' LIMIT 10");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    template: String,
    bindings: Fields,
    limit: Option<u64>,
    offset: Option<u64>,
    filters: Vec<Filter>,
}

impl Query {
    /// Creates a query from a template.
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            ..Self::default()
        }
    }

    /// Binds a value to a placeholder.
    #[must_use]
    pub fn bind<V: ToValue>(mut self, name: &str, value: V) -> Self {
        self.bindings.insert(name.to_string(), value.to_value());
        self
    }

    /// Limits the number of rows the server returns.
    #[must_use]
    pub const fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Skips rows on the server.
    #[must_use]
    pub const fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    /// Appends a post-fetch filter.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Returns the template text.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Returns the server-side limit.
    #[must_use]
    pub const fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    /// Returns the server-side offset.
    #[must_use]
    pub const fn offset_value(&self) -> Option<u64> {
        self.offset
    }

    /// Returns the post-fetch filters.
    #[must_use]
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Returns true if any server-side pagination is set.
    #[must_use]
    pub const fn is_paginated(&self) -> bool {
        self.limit.is_some() || self.offset.is_some()
    }

    /// Checks that filters and server-side pagination are not combined.
    ///
    /// Filtering after a `LIMIT` would under-count, so the combination is
    /// rejected before any I/O.
    pub fn validate(&self) -> Result<()> {
        if self.is_paginated() && !self.filters.is_empty() {
            return Err(OrmError::Constraint(String::from(
                "post-fetch filters cannot be combined with limit/offset",
            )));
        }
        Ok(())
    }

    /// Resolves the template without pagination.
    pub fn resolve(&self, table: &str, dialect: &dyn Dialect) -> Result<String> {
        let template = self.template.as_str();
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let name = after
                .find('}')
                .map(|end| &after[..end])
                .filter(|name| is_placeholder_name(name));

            match name {
                Some(name) => {
                    if name == TABLE_PLACEHOLDER {
                        out.push_str(&dialect.quote_identifier(table));
                    } else {
                        let value = self.bindings.get(name).ok_or_else(|| {
                            OrmError::Query(format!("no value bound for placeholder `{name}`"))
                        })?;
                        out.push_str(&dialect.quote(value));
                    }
                    rest = &after[name.len() + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        Ok(out)
    }

    /// Resolves the template and appends `LIMIT` / `OFFSET`.
    pub fn to_sql(&self, table: &str, dialect: &dyn Dialect) -> Result<String> {
        let mut sql = self.resolve(table, dialect)?;
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => sql.push_str(&format!(
                " LIMIT {} OFFSET {offset}",
                dialect.unbounded_limit()
            )),
            (None, None) => {}
        }
        Ok(sql)
    }

    /// Derives the companion row-count query.
    ///
    /// The projection between `SELECT` and the top-level `FROM` is replaced
    /// with `COUNT(*)`; pagination is not applied.
    pub fn count_sql(&self, table: &str, dialect: &dyn Dialect) -> Result<String> {
        let sql = self.resolve(table, dialect)?;
        count_query(&sql)
    }
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Rewrites `SELECT <projection> FROM ...` into `SELECT COUNT(*) FROM ...`.
pub(crate) fn count_query(sql: &str) -> Result<String> {
    let trimmed = sql.trim_start();
    let is_select = trimmed
        .get(..6)
        .is_some_and(|kw| kw.eq_ignore_ascii_case("select"));
    if !is_select {
        return Err(OrmError::Query(String::from(
            "count query requires a SELECT statement",
        )));
    }

    let from = find_top_level_from(trimmed)
        .ok_or_else(|| OrmError::Query(String::from("no top-level FROM clause to count over")))?;
    Ok(format!("SELECT COUNT(*) {}", &trimmed[from..]))
}

/// Byte offset of the first `FROM` keyword outside parentheses and quotes.
fn find_top_level_from(sql: &str) -> Option<usize> {
    let bytes = sql.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;

    for (i, &b) in bytes.iter().enumerate() {
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            continue;
        }
        match b {
            b'\'' | b'"' | b'`' => quote = Some(b),
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b'f' | b'F' if depth == 0 => {
                let is_from = sql
                    .get(i..i + 4)
                    .is_some_and(|word| word.eq_ignore_ascii_case("from"));
                let before_ok = i == 0 || !is_word_byte(bytes[i - 1]);
                let after_ok = bytes.get(i + 4).map_or(true, |&next| !is_word_byte(next));
                if is_from && before_ok && after_ok {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

const fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use storm_core::{MySqlDialect, SqliteDialect, Value};

    #[test]
    fn test_table_and_bindings() {
        let query = Query::new("SELECT id FROM {table} WHERE name = {name} AND age > {age}")
            .bind("name", "O'Brien")
            .bind("age", 30);
        let sql = query.resolve("users", &SqliteDialect::new()).unwrap();
        assert_eq!(
            sql,
            "SELECT id FROM \"users\" WHERE name = 'O''Brien' AND age > 30"
        );
    }

    #[test]
    fn test_substituted_text_is_not_rescanned() {
        let query = Query::new("SELECT * FROM {table} WHERE a = {a} AND b = {b}")
            .bind("a", "{b}")
            .bind("b", 1);
        let sql = query.resolve("t", &SqliteDialect::new()).unwrap();
        assert_eq!(sql, "SELECT * FROM \"t\" WHERE a = '{b}' AND b = 1");
    }

    #[test]
    fn test_non_placeholder_braces_are_kept() {
        let query = Query::new("SELECT '{ not a placeholder }' FROM {table}");
        let sql = query.resolve("t", &SqliteDialect::new()).unwrap();
        assert_eq!(sql, "SELECT '{ not a placeholder }' FROM \"t\"");
    }

    #[test]
    fn test_unbound_placeholder() {
        let query = Query::new("SELECT * FROM {table} WHERE id = {id}");
        let err = query.resolve("t", &SqliteDialect::new()).unwrap_err();
        assert!(matches!(err, OrmError::Query(_)));
    }

    #[test]
    fn test_null_binding() {
        let query = Query::new("UPDATE {table} SET note = {note}").bind("note", Value::Null);
        let sql = query.resolve("t", &MySqlDialect::new()).unwrap();
        assert_eq!(sql, "UPDATE `t` SET note = null");
    }

    #[test]
    fn test_limit_offset() {
        let d = SqliteDialect::new();
        let q = Query::new("SELECT * FROM {table}").limit(10).offset(20);
        assert_eq!(q.to_sql("t", &d).unwrap(), "SELECT * FROM \"t\" LIMIT 10 OFFSET 20");
        let q = Query::new("SELECT * FROM {table}").offset(5);
        assert_eq!(q.to_sql("t", &d).unwrap(), "SELECT * FROM \"t\" LIMIT -1 OFFSET 5");
    }

    #[test]
    fn test_count_query_replaces_projection() {
        let q = Query::new("SELECT id, (SELECT max(x) FROM y) AS m FROM {table} WHERE a = {a}")
            .bind("a", 1)
            .limit(10);
        let sql = q.count_sql("t", &SqliteDialect::new()).unwrap();
        assert_eq!(sql, "SELECT COUNT(*) FROM \"t\" WHERE a = 1");
    }

    #[test]
    fn test_count_query_skips_quoted_from() {
        let sql = count_query("select 'from' as word, name FROM t").unwrap();
        assert_eq!(sql, "SELECT COUNT(*) FROM t");
    }

    #[test]
    fn test_count_query_requires_select() {
        assert!(count_query("DELETE FROM t").is_err());
        assert!(count_query("SELECT 1").is_err());
    }

    #[test]
    fn test_filters_with_limit_are_rejected() {
        let q = Query::new("SELECT * FROM {table}")
            .limit(5)
            .filter(Filter::eq("status", "active"));
        assert!(matches!(q.validate(), Err(OrmError::Constraint(_))));

        let q = Query::new("SELECT * FROM {table}").filter(Filter::eq("status", "active"));
        assert!(q.validate().is_ok());
    }
}
