//! Serialization utilities
//!
//! This module converts arbitrary serializable request data into statement
//! parameters.

use crate::errors::TypeMappingError;
use crate::types::{Params, SqlValue};
use serde::Serialize;

/// Convert a JSON value to the parameter it binds as.
///
/// Arrays and objects have no parameter type of their own and are passed
/// through as their JSON text.
pub fn json_to_sql_value(value: serde_json::Value) -> SqlValue {
    match value {
        serde_json::Value::String(s) => SqlValue::Text(s),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                SqlValue::Decimal(f)
            } else {
                SqlValue::Text(n.to_string())
            }
        }
        serde_json::Value::Bool(b) => SqlValue::Bool(b),
        serde_json::Value::Null => SqlValue::Null,
        other => SqlValue::Text(other.to_string()),
    }
}

/// Build parameters from the top-level fields of a serializable struct or map
pub fn serialize_to_params<T: Serialize>(data: &T) -> Result<Params, TypeMappingError> {
    match serde_json::to_value(data)? {
        serde_json::Value::Object(map) => Ok(map
            .into_iter()
            .map(|(key, value)| (key, json_to_sql_value(value)))
            .collect()),
        other => Err(TypeMappingError::NotAnObject(json_kind(&other))),
    }
}

impl Params {
    /// See [`serialize_to_params`]
    pub fn from_serializable<T: Serialize>(data: &T) -> Result<Self, TypeMappingError> {
        serialize_to_params(data)
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct NewOrder {
        customer: String,
        weight_kg: f64,
        items: i32,
        express: bool,
        note: Option<String>,
        tags: Vec<String>,
    }

    #[test]
    fn test_struct_fields_become_params() {
        let order = NewOrder {
            customer: "Ana".to_string(),
            weight_kg: 3.5,
            items: 4,
            express: true,
            note: None,
            tags: vec!["shirts".to_string()],
        };

        let params = Params::from_serializable(&order).unwrap();
        assert_eq!(params.get("customer"), Some(&SqlValue::Text("Ana".to_string())));
        assert_eq!(params.get("weight_kg"), Some(&SqlValue::Decimal(3.5)));
        assert_eq!(params.get("items"), Some(&SqlValue::Integer(4)));
        assert_eq!(params.get("express"), Some(&SqlValue::Bool(true)));
        assert_eq!(params.get("note"), Some(&SqlValue::Null));
        assert_eq!(
            params.get("tags"),
            Some(&SqlValue::Text("[\"shirts\"]".to_string()))
        );
    }

    #[test]
    fn test_non_object_is_rejected() {
        let result = serialize_to_params(&json!([1, 2, 3]));
        assert!(matches!(result, Err(TypeMappingError::NotAnObject("array"))));
    }
}
