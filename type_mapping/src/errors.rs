//! Error types for parameter mapping and statement building

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TypeMappingError {
    #[error("Invalid parameter name: {0}")]
    InvalidParameterName(String),

    #[error("Invalid procedure name: {0}")]
    InvalidProcedureName(String),

    #[error("Parameters must serialize to an object, got {0}")]
    NotAnObject(&'static str),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
