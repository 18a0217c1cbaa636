//! # QueryHaus
//!
//! SQL Server access layer with a lazily connected, retried connection pool,
//! TTL query caching, atomic batches and in-memory performance metrics.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use queryhaus::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!     let db = QueryHaus::with_sql_server(config)?;
//!
//!     let params = Params::new().with("status", "pending");
//!     let orders = db
//!         .execute_query_cached(
//!             "SELECT * FROM LaundryOrders WHERE Status = @status",
//!             &params,
//!             None,
//!             Some(60),
//!         )
//!         .await?;
//!     println!("{} pending orders", orders.len());
//!
//!     // Writes do not touch the cache; clear what they affect
//!     db.execute_transaction(&[
//!         Statement::new(
//!             "UPDATE LaundryOrders SET Status = 'done' WHERE Id = @id",
//!             Params::new().with("id", 7),
//!         ),
//!         Statement::new(
//!             "INSERT INTO OrderHistory (OrderId, Status) VALUES (@id, 'done')",
//!             Params::new().with("id", 7),
//!         ),
//!     ])
//!     .await?;
//!     db.clear_cache(Some("query:")).await;
//!
//!     let health = db.check_database_health().await;
//!     println!("{:?} in {} ms", health.status, health.response_time_ms);
//!
//!     db.shutdown().await;
//!     Ok(())
//! }
//! ```

/// Conditional debug logging macros
/// These macros only compile in code when the `debug-logging` feature is enabled
#[cfg(feature = "debug-logging")]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "debug-logging")]
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {
        tracing::trace!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {};
}

pub mod connection;
pub mod core;
pub mod driver;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod prelude;
pub mod response;
pub mod transaction;

// Re-export the main public types for convenience
pub use self::core::QueryHaus;
pub use errors::QueryHausError;
pub use health::{HealthReport, HealthStatus};
pub use metrics::{PerformanceMetric, PerformanceSummary};
pub use transaction::Statement;

// Re-export centralized config
pub use config::{AppConfig, CacheConfig, DatabaseConfig, MetricsConfig, RetryConfig};

// Re-export internal crates used in the public API
pub use cache_system;
pub use type_mapping;

// Re-export external dependencies used in public API
pub use async_trait;
pub use tiberius;
