//! SQL dialects and literal quoting.
//!
//! Relational backends build SQL text with quoted literals rather than bound
//! parameters. Quoting is the only injection defense for values; identifiers
//! (table and field names) are trusted and only wrapped in the dialect's
//! identifier quote.

mod mysql;
mod sqlite;

pub use mysql::MySqlDialect;
pub use sqlite::SqliteDialect;

use crate::value::{Value, TIMESTAMP_FORMAT};

/// Sentinel text that asks the server for its current time.
pub const NOW: &str = "NOW()";

/// Trait for SQL dialect-specific behavior.
pub trait Dialect: Send + Sync {
    /// Returns the name of the dialect.
    fn name(&self) -> &'static str;

    /// Returns the identifier quote character.
    fn identifier_quote(&self) -> char {
        '"'
    }

    /// Escapes the body of a string literal (without the surrounding quotes).
    fn escape_string(&self, s: &str) -> String;

    /// Returns the expression that evaluates to the server's current time.
    fn current_timestamp(&self) -> &'static str;

    /// Returns the LIMIT value that means "no limit", for OFFSET-only queries.
    fn unbounded_limit(&self) -> &'static str {
        "-1"
    }

    /// Quotes an identifier.
    fn quote_identifier(&self, name: &str) -> String {
        let quote = self.identifier_quote();
        format!("{quote}{name}{quote}")
    }

    /// Renders a value as a SQL literal.
    ///
    /// - `Null` becomes `null`
    /// - timestamps become quoted `YYYY-MM-DD HH:MM:SS[.ffffff]` text
    /// - the text `NOW()` becomes the server current-time expression, unquoted
    /// - bytes are decoded to text and quoted
    /// - floats and integers are rendered unquoted, booleans as `1` / `0`;
    ///   NaN and infinities have no SQL literal and become `null`
    /// - everything else is escaped and single-quoted
    fn quote(&self, value: &Value) -> String {
        match value {
            Value::Null => String::from("null"),
            Value::Timestamp(ts) => format!("'{}'", ts.format(TIMESTAMP_FORMAT)),
            Value::Text(s) if s == NOW => String::from(self.current_timestamp()),
            Value::Text(s) => format!("'{}'", self.escape_string(s)),
            Value::Bytes(b) => format!("'{}'", self.escape_string(&String::from_utf8_lossy(b))),
            Value::Float(x) => format_float(*x),
            Value::Int(n) => n.to_string(),
            Value::Bool(b) => String::from(if *b { "1" } else { "0" }),
            Value::Json(v) => format!("'{}'", self.escape_string(&v.to_string())),
        }
    }
}

/// Plain decimal rendering that always reads back as a float.
fn format_float(x: f64) -> String {
    if !x.is_finite() {
        String::from("null")
    } else if x.fract() == 0.0 {
        format!("{x:.1}")
    } else {
        format!("{x}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_quote_scalars() {
        let d = SqliteDialect::new();
        assert_eq!(d.quote(&Value::Null), "null");
        assert_eq!(d.quote(&Value::Int(-7)), "-7");
        assert_eq!(d.quote(&Value::Float(2.5)), "2.5");
        assert_eq!(d.quote(&Value::Float(3.0)), "3.0");
        assert_eq!(d.quote(&Value::Bool(true)), "1");
        assert_eq!(d.quote(&Value::Text("hello".into())), "'hello'");
    }

    #[test]
    fn test_non_finite_floats_become_null() {
        let d = SqliteDialect::new();
        assert_eq!(d.quote(&Value::Float(f64::NAN)), "null");
        assert_eq!(d.quote(&Value::Float(f64::INFINITY)), "null");
        assert_eq!(d.quote(&Value::Float(f64::NEG_INFINITY)), "null");
        assert_eq!(MySqlDialect::new().quote(&Value::Float(f64::NAN)), "null");
    }

    #[test]
    fn test_quote_timestamp() {
        let ts = NaiveDate::from_ymd_opt(2023, 12, 31)
            .unwrap()
            .and_hms_micro_opt(23, 59, 58, 250_000)
            .unwrap();
        assert_eq!(
            SqliteDialect::new().quote(&Value::Timestamp(ts)),
            "'2023-12-31 23:59:58.250'"
        );
    }

    #[test]
    fn test_now_sentinel_passes_through() {
        assert_eq!(MySqlDialect::new().quote(&Value::Text(NOW.into())), "NOW()");
        assert_eq!(
            SqliteDialect::new().quote(&Value::Text(NOW.into())),
            "CURRENT_TIMESTAMP"
        );
    }

    #[test]
    fn test_bytes_are_decoded() {
        let d = SqliteDialect::new();
        assert_eq!(d.quote(&Value::Bytes(b"it's".to_vec())), "'it''s'");
    }

    #[test]
    fn test_json_is_quoted_text() {
        let d = SqliteDialect::new();
        let v = Value::Json(serde_json::json!({"a": 1}));
        assert_eq!(d.quote(&v), r#"'{"a":1}'"#);
    }
}
