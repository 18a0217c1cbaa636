//! Type mapping definitions
//!
//! This module provides the parameter values callers bind to statements,
//! the SQL Server wire types they map to, and the row shapes returned.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single row keyed by column name, in result column order
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Rows of one result set, in the order the server returned them
pub type RowSet = Vec<Row>;

/// Parameter value bound to a query or stored procedure
///
/// Serializes as the bare JSON scalar, so cache keys and logs show `7`
/// rather than a tagged variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Text(String),
    Integer(i64),
    Decimal(f64),
    Bool(bool),
    Null,
}

/// SQL Server wire type a parameter is sent as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlType {
    NVarChar,
    Int,
    BigInt,
    Float,
    Bit,
    /// Untyped null
    Null,
}

impl SqlValue {
    /// Wire type this value is sent as
    pub fn sql_type(&self) -> SqlType {
        match self {
            SqlValue::Text(_) => SqlType::NVarChar,
            SqlValue::Integer(i) => {
                if *i >= i32::MIN as i64 && *i <= i32::MAX as i64 {
                    SqlType::Int
                } else {
                    SqlType::BigInt
                }
            }
            SqlValue::Decimal(_) => SqlType::Float,
            SqlValue::Bool(_) => SqlType::Bit,
            SqlValue::Null => SqlType::Null,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl SqlType {
    /// T-SQL type used in a parameter declaration list
    pub fn declaration(&self) -> &'static str {
        match self {
            SqlType::NVarChar => "nvarchar(max)",
            SqlType::Int => "int",
            SqlType::BigInt => "bigint",
            SqlType::Float => "float",
            SqlType::Bit => "bit",
            // A declaration needs some type; NULL converts implicitly from nvarchar.
            SqlType::Null => "nvarchar(max)",
        }
    }
}

/// Named parameters for one statement.
///
/// Names are kept sorted so that serialization is stable regardless of
/// insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, SqlValue>);

impl Params {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert a value. A leading `@` is dropped, so `@id` and `id` name the
    /// same parameter.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<SqlValue>) {
        let mut name = name.into();
        if name.starts_with('@') {
            name.remove(0);
        }
        self.0.insert(name, value.into());
    }

    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SqlValue)> {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<SqlValue>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (name, value) in iter {
            params.insert(name, value);
        }
        params
    }
}

/// Convert basic Rust types to SqlValue
impl From<String> for SqlValue {
    fn from(val: String) -> Self {
        SqlValue::Text(val)
    }
}

impl From<&str> for SqlValue {
    fn from(val: &str) -> Self {
        SqlValue::Text(val.to_string())
    }
}

impl From<i32> for SqlValue {
    fn from(val: i32) -> Self {
        SqlValue::Integer(val as i64)
    }
}

impl From<i64> for SqlValue {
    fn from(val: i64) -> Self {
        SqlValue::Integer(val)
    }
}

impl From<f64> for SqlValue {
    fn from(val: f64) -> Self {
        SqlValue::Decimal(val)
    }
}

impl From<bool> for SqlValue {
    fn from(val: bool) -> Self {
        SqlValue::Bool(val)
    }
}

impl<T> From<Option<T>> for SqlValue
where
    T: Into<SqlValue>,
{
    fn from(val: Option<T>) -> Self {
        match val {
            Some(v) => v.into(),
            None => SqlValue::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_type_inference() {
        assert_eq!(SqlValue::from("abc").sql_type(), SqlType::NVarChar);
        assert_eq!(SqlValue::from(42).sql_type(), SqlType::Int);
        assert_eq!(SqlValue::from(i64::MAX).sql_type(), SqlType::BigInt);
        assert_eq!(SqlValue::from(1.5).sql_type(), SqlType::Float);
        assert_eq!(SqlValue::from(true).sql_type(), SqlType::Bit);
        assert_eq!(SqlValue::from(None::<i32>).sql_type(), SqlType::Null);
        assert_eq!(SqlValue::from(Some(7)).sql_type(), SqlType::Int);
    }

    #[test]
    fn test_params_serialize_in_name_order() {
        let a = Params::new().with("b", 2).with("a", "x");
        let b = Params::new().with("a", "x").with("b", 2);

        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
        assert_eq!(serde_json::to_string(&a).unwrap(), r#"{"a":"x","b":2}"#);
        assert_eq!(a.iter().next().map(|(k, _)| k.as_str()), Some("a"));
    }

    #[test]
    fn test_at_prefix_names_the_same_parameter() {
        let params = Params::new().with("@id", 1).with("id", 2);
        assert_eq!(params.len(), 1);
        assert_eq!(params.get("id"), Some(&SqlValue::Integer(2)));
        assert_eq!(params, Params::from_iter([("@id", 2)]));
    }
}
