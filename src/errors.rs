//! Error types for the QueryHaus crate
//!
//! This module contains all error types that can be returned by QueryHaus operations.

use crate::driver::DriverError;
use cache_system::CacheError;
use config::ConfigError;
use thiserror::Error;
use type_mapping::TypeMappingError;

#[derive(Error, Debug)]
pub enum QueryHausError {
    /// Every connection attempt failed; carries the last driver error
    #[error("Database connection failed after {attempts} attempt(s): {source}")]
    Connection {
        attempts: u32,
        #[source]
        source: DriverError,
    },

    #[error("Query execution error: {0}")]
    QueryExecution(#[source] DriverError),

    /// A batch failed and was rolled back. `index` is the failing statement,
    /// `None` when the commit itself failed.
    #[error("Transaction rolled back: {source}")]
    Transaction {
        index: Option<usize>,
        #[source]
        source: DriverError,
    },

    #[error("Invalid statement: {0}")]
    InvalidStatement(#[from] TypeMappingError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<DriverError> for QueryHausError {
    fn from(error: DriverError) -> Self {
        match error {
            DriverError::Statement(e) => QueryHausError::InvalidStatement(e),
            other => QueryHausError::QueryExecution(other),
        }
    }
}
