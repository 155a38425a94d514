//! MySQL dialect.

use super::Dialect;

/// MySQL: backtick identifiers, backslash escapes in string literals.
#[derive(Debug, Default, Clone, Copy)]
pub struct MySqlDialect;

impl MySqlDialect {
    /// Creates a new MySQL dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Dialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn identifier_quote(&self) -> char {
        '`'
    }

    // Same character set as mysql_real_escape_string.
    fn escape_string(&self, s: &str) -> String {
        let mut out = String::with_capacity(s.len());
        for c in s.chars() {
            match c {
                '\\' => out.push_str("\\\\"),
                '\'' => out.push_str("\\'"),
                '"' => out.push_str("\\\""),
                '\0' => out.push_str("\\0"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\x1a' => out.push_str("\\Z"),
                _ => out.push(c),
            }
        }
        out
    }

    fn current_timestamp(&self) -> &'static str {
        "NOW()"
    }

    fn unbounded_limit(&self) -> &'static str {
        "18446744073709551615"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;

    #[test]
    fn test_mysql_identifiers() {
        assert_eq!(MySqlDialect::new().quote_identifier("users"), "`users`");
    }

    #[test]
    fn test_mysql_escaping() {
        let d = MySqlDialect::new();
        assert_eq!(d.quote(&Value::Text("O'Brien".into())), r"'O\'Brien'");
        assert_eq!(d.quote(&Value::Text(r"a\b".into())), r"'a\\b'");
        assert_eq!(d.quote(&Value::Text("line\nbreak".into())), r"'line\nbreak'");
    }
}
