use super::plan::QueryError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Comparison used by [`Collection::filter_metadata`](super::Collection::filter_metadata).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    LessThan,
    LessThanOrEquals,
    GreaterThan,
    GreaterThanOrEquals,
    Equals,
    NotEquals,
}

impl FilterOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::LessThan => "<",
            Self::LessThanOrEquals => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEquals => ">=",
            Self::Equals => "==",
            Self::NotEquals => "!=",
        }
    }

    /// Whether `property <op> value` holds.
    ///
    /// Numbers compare numerically and strings lexically. Any other pairing only
    /// supports (in)equality.
    pub fn matches(&self, property: &Value, value: &Value) -> bool {
        let ordering = compare_values(property, value);
        match (self, ordering) {
            (Self::Equals, _) => ordering == Some(Ordering::Equal) || property == value,
            (Self::NotEquals, _) => !(ordering == Some(Ordering::Equal) || property == value),
            (_, None) => false,
            (Self::LessThan, Some(o)) => o == Ordering::Less,
            (Self::LessThanOrEquals, Some(o)) => o != Ordering::Greater,
            (Self::GreaterThan, Some(o)) => o == Ordering::Greater,
            (Self::GreaterThanOrEquals, Some(o)) => o != Ordering::Less,
        }
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for FilterOp {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "<" | "lt" => Ok(Self::LessThan),
            "<=" | "lte" => Ok(Self::LessThanOrEquals),
            ">" | "gt" => Ok(Self::GreaterThan),
            ">=" | "gte" => Ok(Self::GreaterThanOrEquals),
            "==" | "eq" => Ok(Self::Equals),
            "!=" | "neq" => Ok(Self::NotEquals),
            _ => Err(QueryError::UnknownOperator(s.to_string())),
        }
    }
}

/// Orders two property values: numbers numerically, strings lexically.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
