//! Post-fetch row filters.
//!
//! Filters run on the client after rows come back from the backend. A row
//! survives the chain only if every filter matches it.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use storm_core::{Fields, ToValue, Value};

use crate::error::OrmError;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    /// Equal (=)
    Eq,
    /// Not equal (!=)
    Ne,
    /// Greater than (>)
    Gt,
    /// Greater than or equal (>=)
    Gte,
    /// Less than (<)
    Lt,
    /// Less than or equal (<=)
    Lte,
    /// Membership (in)
    In,
    /// Non-membership (not in)
    NotIn,
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq => write!(f, "="),
            Self::Ne => write!(f, "!="),
            Self::Gt => write!(f, ">"),
            Self::Gte => write!(f, ">="),
            Self::Lt => write!(f, "<"),
            Self::Lte => write!(f, "<="),
            Self::In => write!(f, "in"),
            Self::NotIn => write!(f, "not in"),
        }
    }
}

impl FromStr for Comparator {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "=" | "==" => Ok(Self::Eq),
            "!=" | "<>" => Ok(Self::Ne),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Gte),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Lte),
            "in" => Ok(Self::In),
            "not in" => Ok(Self::NotIn),
            other => Err(OrmError::Query(format!("unknown comparator: {other}"))),
        }
    }
}

/// Right-hand side of a filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A single value.
    Scalar(Value),
    /// A list of values, for membership tests.
    List(Vec<Value>),
}

/// A `(field, comparator, value)` triple.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    field: String,
    op: Comparator,
    operand: Operand,
}

impl Filter {
    /// Creates a filter with a scalar operand.
    pub fn new<V: ToValue>(field: &str, op: Comparator, value: V) -> Self {
        Self {
            field: field.to_string(),
            op,
            operand: Operand::Scalar(value.to_value()),
        }
    }

    /// Creates a filter from a comparator string such as `">="` or `"not in"`.
    pub fn parse<V: ToValue>(field: &str, op: &str, value: V) -> crate::Result<Self> {
        Ok(Self::new(field, op.parse()?, value))
    }

    /// Creates an equality filter (field = value).
    pub fn eq<V: ToValue>(field: &str, value: V) -> Self {
        Self::new(field, Comparator::Eq, value)
    }

    /// Creates an inequality filter (field != value).
    pub fn ne<V: ToValue>(field: &str, value: V) -> Self {
        Self::new(field, Comparator::Ne, value)
    }

    /// Creates a greater-than filter (field > value).
    pub fn gt<V: ToValue>(field: &str, value: V) -> Self {
        Self::new(field, Comparator::Gt, value)
    }

    /// Creates a greater-than-or-equal filter (field >= value).
    pub fn gte<V: ToValue>(field: &str, value: V) -> Self {
        Self::new(field, Comparator::Gte, value)
    }

    /// Creates a less-than filter (field < value).
    pub fn lt<V: ToValue>(field: &str, value: V) -> Self {
        Self::new(field, Comparator::Lt, value)
    }

    /// Creates a less-than-or-equal filter (field <= value).
    pub fn lte<V: ToValue>(field: &str, value: V) -> Self {
        Self::new(field, Comparator::Lte, value)
    }

    /// Creates a membership filter.
    pub fn in_list<V: ToValue>(field: &str, values: Vec<V>) -> Self {
        Self {
            field: field.to_string(),
            op: Comparator::In,
            operand: Operand::List(values.into_iter().map(ToValue::to_value).collect()),
        }
    }

    /// Creates a non-membership filter.
    pub fn not_in_list<V: ToValue>(field: &str, values: Vec<V>) -> Self {
        Self {
            field: field.to_string(),
            op: Comparator::NotIn,
            operand: Operand::List(values.into_iter().map(ToValue::to_value).collect()),
        }
    }

    /// Returns the filtered field name.
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Returns the comparator.
    #[must_use]
    pub const fn comparator(&self) -> Comparator {
        self.op
    }

    /// Returns true if `row` passes this filter. Missing fields read as null.
    #[must_use]
    pub fn matches(&self, row: &Fields) -> bool {
        let actual = row.get(&self.field).unwrap_or(&Value::Null);
        match (self.op, &self.operand) {
            (Comparator::In, operand) => contains(operand, actual),
            (Comparator::NotIn, operand) => !contains(operand, actual),
            (op, Operand::Scalar(expected)) => compare(op, actual, expected),
            // A list only makes sense for membership; nothing else matches it.
            (_, Operand::List(_)) => false,
        }
    }
}

fn contains(operand: &Operand, actual: &Value) -> bool {
    match operand {
        Operand::List(values) => values.iter().any(|v| v.loose_eq(actual)),
        Operand::Scalar(value) => value.loose_eq(actual),
    }
}

fn compare(op: Comparator, actual: &Value, expected: &Value) -> bool {
    let ordering = actual.compare(expected);
    match op {
        Comparator::Eq => ordering == Some(Ordering::Equal),
        Comparator::Ne => ordering != Some(Ordering::Equal),
        Comparator::Gt => ordering == Some(Ordering::Greater),
        Comparator::Gte => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        Comparator::Lt => ordering == Some(Ordering::Less),
        Comparator::Lte => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        Comparator::In | Comparator::NotIn => false,
    }
}

/// Applies a filter chain to `rows`.
///
/// Returns the surviving rows, in their original order, and the number of
/// rows removed.
#[must_use]
pub fn apply_filters(rows: Vec<Fields>, filters: &[Filter]) -> (Vec<Fields>, usize) {
    if filters.is_empty() {
        return (rows, 0);
    }
    let before = rows.len();
    let kept: Vec<Fields> = rows
        .into_iter()
        .filter(|row| filters.iter().all(|f| f.matches(row)))
        .collect();
    let removed = before - kept.len();
    (kept, removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use storm_core::fields;

    fn rows() -> Vec<Fields> {
        vec![
            fields! { "status" => "active", "score" => 60 },
            fields! { "status" => "active", "score" => 10 },
            fields! { "status" => "closed", "score" => 90 },
        ]
    }

    #[test]
    fn test_chain_keeps_rows_matching_every_filter() {
        let filters = vec![
            Filter::parse("status", "=", "active").unwrap(),
            Filter::parse("score", ">", 50).unwrap(),
        ];
        let (kept, removed) = apply_filters(rows(), &filters);
        assert_eq!(kept, vec![fields! { "status" => "active", "score" => 60 }]);
        assert_eq!(removed, 2);
    }

    #[test]
    fn test_empty_chain_keeps_everything() {
        let (kept, removed) = apply_filters(rows(), &[]);
        assert_eq!(kept.len(), 3);
        assert_eq!(removed, 0);
    }

    #[test]
    fn test_membership() {
        let filter = Filter::in_list("score", vec![10, 90]);
        let (kept, _) = apply_filters(rows(), &[filter]);
        assert_eq!(kept.len(), 2);

        let filter = Filter::not_in_list("status", vec!["closed"]);
        let (kept, removed) = apply_filters(rows(), &[filter]);
        assert_eq!(kept.len(), 2);
        assert_eq!(removed, 1);
    }

    #[test]
    fn test_ordering_comparators() {
        let row = fields! { "score" => 50 };
        assert!(Filter::gte("score", 50).matches(&row));
        assert!(Filter::lte("score", 50.0).matches(&row));
        assert!(!Filter::lt("score", 50).matches(&row));
        assert!(Filter::ne("score", 49).matches(&row));
    }

    #[test]
    fn test_missing_field_reads_as_null() {
        let row = fields! { "other" => 1 };
        assert!(!Filter::gt("score", 0).matches(&row));
        assert!(Filter::eq("score", Value::Null).matches(&row));
    }

    #[test]
    fn test_comparator_parsing() {
        assert_eq!("NOT IN".parse::<Comparator>().unwrap(), Comparator::NotIn);
        assert_eq!(">=".parse::<Comparator>().unwrap(), Comparator::Gte);
        assert!(matches!("~".parse::<Comparator>(), Err(OrmError::Query(_))));
        assert_eq!(Comparator::Ne.to_string(), "!=");
    }
}
