//! Cache system for in-memory query result caching
//!
//! This crate provides a TTL cache with lazy expiry, a background sweep
//! and substring-based invalidation.

pub mod errors;
pub mod manager;
pub mod prelude;

// Re-export centralized config
pub use config::CacheConfig;

pub use errors::CacheError;
pub use manager::{CacheManager, CacheStats};
