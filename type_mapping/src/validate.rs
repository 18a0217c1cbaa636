//! Validation utilities for type mapping
//!
//! Names that end up in statement text are checked here, since they cannot
//! be bound as parameters.

use crate::errors::TypeMappingError;
use crate::types::Params;

/// Check that a name is a plain T-SQL identifier
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Normalize a parameter name, accepting an optional leading `@`
pub fn parameter_name(name: &str) -> Result<&str, TypeMappingError> {
    let bare = name.strip_prefix('@').unwrap_or(name);
    if is_valid_identifier(bare) {
        Ok(bare)
    } else {
        Err(TypeMappingError::InvalidParameterName(name.to_string()))
    }
}

/// Check every parameter name before a statement is sent
pub fn validate_params(params: &Params) -> Result<(), TypeMappingError> {
    params.iter().try_for_each(|(name, _)| parameter_name(name).map(|_| ()))
}

/// Bracket-quote a possibly schema-qualified object name (`dbo.GetOrders`)
pub fn quote_object_name(name: &str) -> Result<String, TypeMappingError> {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() > 3 || parts.iter().any(|p| p.trim().is_empty()) {
        return Err(TypeMappingError::InvalidProcedureName(name.to_string()));
    }

    Ok(parts
        .iter()
        .map(|part| {
            let part = part
                .trim()
                .trim_start_matches('[')
                .trim_end_matches(']');
            format!("[{}]", part.replace(']', "]]"))
        })
        .collect::<Vec<_>>()
        .join("."))
}
