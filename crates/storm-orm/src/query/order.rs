//! Sort specifications.

use storm_core::Dialect;

/// Order direction for sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    /// Ascending order (ASC)
    Asc,
    /// Descending order (DESC)
    Desc,
}

/// An ordering specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// Field to order by
    pub field: String,
    /// Order direction
    pub direction: OrderDirection,
}

impl OrderBy {
    /// Creates a new ascending order specification.
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: OrderDirection::Asc,
        }
    }

    /// Creates a new descending order specification.
    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: OrderDirection::Desc,
        }
    }

    /// Parses an order specification.
    ///
    /// Prefix with `-` for descending order.
    /// Example: `"-created_at"` for descending, `"name"` for ascending.
    pub fn parse(spec: &str) -> Self {
        if let Some(field) = spec.strip_prefix('-') {
            Self::desc(field)
        } else {
            Self::asc(spec)
        }
    }

    /// Returns the SQL representation.
    pub fn to_sql(&self, dialect: &dyn Dialect) -> String {
        let field = dialect.quote_identifier(&self.field);
        match self.direction {
            OrderDirection::Asc => format!("{field} ASC"),
            OrderDirection::Desc => format!("{field} DESC"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storm_core::SqliteDialect;

    #[test]
    fn test_order_by_parsing() {
        assert_eq!(OrderBy::parse("-created_at").direction, OrderDirection::Desc);
        assert_eq!(OrderBy::parse("name").direction, OrderDirection::Asc);
        assert_eq!(OrderBy::parse("-created_at").field, "created_at");
    }

    #[test]
    fn test_to_sql() {
        let d = SqliteDialect::new();
        assert_eq!(OrderBy::desc("score").to_sql(&d), "\"score\" DESC");
    }
}
