//! Convenience re-exports for common QueryHaus usage
//!
//! # Example
//!
//! ```rust
//! use queryhaus::prelude::*;
//!
//! let params = Params::new().with("id", 42);
//! ```

// Core QueryHaus components
pub use crate::core::QueryHaus;
pub use crate::driver::{Driver, DriverError, ErrorListener, Pool, TdsDriver, Transaction};
pub use crate::errors::QueryHausError;
pub use crate::health::{HealthReport, HealthStatus};
pub use crate::metrics::{MetricsRecorder, PerformanceMetric, PerformanceSummary};
pub use crate::response::{ApiError, ApiResponse, Reply};
pub use crate::transaction::Statement;

// Re-export centralized config
pub use config::{AppConfig, CacheConfig, DatabaseConfig, MetricsConfig, RetryConfig};

// Cache system
pub use cache_system::prelude::*;

// Parameter and row types
pub use type_mapping::{Params, Row, RowSet, SqlType, SqlValue};

// Common external dependencies
pub use async_trait;
pub use serde_json;
pub use tokio;
