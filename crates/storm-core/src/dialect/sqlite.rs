//! SQLite dialect.

use super::Dialect;

/// SQLite: `"` identifiers, quotes escaped by doubling.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn escape_string(&self, s: &str) -> String {
        s.replace('\'', "''")
    }

    fn current_timestamp(&self) -> &'static str {
        "CURRENT_TIMESTAMP"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;

    #[test]
    fn test_sqlite_dialect() {
        let dialect = SqliteDialect::new();
        assert_eq!(dialect.name(), "sqlite");
        assert_eq!(dialect.quote_identifier("users"), "\"users\"");
    }

    #[test]
    fn test_injection_is_escaped() {
        let malicious = Value::Text(String::from("'; DROP TABLE users; --"));
        assert_eq!(
            SqliteDialect::new().quote(&malicious),
            "'''; DROP TABLE users; --'"
        );
    }

    #[test]
    fn test_backslash_is_literal() {
        let value = Value::Text(String::from(r"C:\temp"));
        assert_eq!(SqliteDialect::new().quote(&value), r"'C:\temp'");
    }
}
