//! Database driver seam
//!
//! The connection manager and executors only talk to these traits. The
//! SQL Server implementation lives in [`tds`]; tests plug in their own.

use async_trait::async_trait;
use config::DatabaseConfig;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use type_mapping::{Params, RowSet, TypeMappingError};

pub mod tds;

pub use tds::TdsDriver;

/// Callback invoked when a pool loses its connection asynchronously
pub type ErrorListener = Arc<dyn Fn(&DriverError) + Send + Sync>;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("SQL Server error: {0}")]
    Tds(#[from] tiberius::error::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid statement: {0}")]
    Statement(#[from] TypeMappingError),

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("Connection pool is closed")]
    PoolClosed,

    #[error("{0}")]
    Other(String),
}

impl DriverError {
    /// Whether the error means the underlying connection is unusable
    pub fn is_connection_error(&self) -> bool {
        match self {
            DriverError::Tds(e) => matches!(
                e,
                tiberius::error::Error::Io { .. }
                    | tiberius::error::Error::Tls(_)
                    | tiberius::error::Error::Protocol(_)
                    | tiberius::error::Error::Routing { .. }
            ),
            DriverError::Io(_) | DriverError::PoolClosed => true,
            _ => false,
        }
    }
}

/// Opens pools. One `connect` call is one connection attempt.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn connect(&self, config: &DatabaseConfig) -> Result<Arc<dyn Pool>, DriverError>;
}

/// A set of live connections shared by all callers
#[async_trait]
pub trait Pool: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Register a callback for asynchronous connection-level errors
    fn on_error(&self, listener: ErrorListener);

    /// Run parameterized query text and return its first result set
    async fn query(&self, text: &str, params: &Params) -> Result<RowSet, DriverError>;

    /// Call a stored procedure and return its first result set
    async fn procedure(&self, name: &str, params: &Params) -> Result<RowSet, DriverError>;

    /// Start a transaction pinned to one connection
    async fn begin(&self) -> Result<Box<dyn Transaction>, DriverError>;

    async fn close(&self);
}

/// An open transaction. Dropping it without commit or rollback discards
/// the connection.
#[async_trait]
pub trait Transaction: Send {
    async fn query(&mut self, text: &str, params: &Params) -> Result<RowSet, DriverError>;

    async fn commit(self: Box<Self>) -> Result<(), DriverError>;

    async fn rollback(self: Box<Self>) -> Result<(), DriverError>;
}
