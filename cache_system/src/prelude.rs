//! Everything needed to cache query results
//!
//! ```rust
//! use cache_system::prelude::*;
//!
//! let cache: CacheManager<Vec<String>> = CacheManager::new(CacheConfig::default());
//! assert_eq!(cache.config().default_ttl_seconds, 300);
//! ```

pub use crate::errors::CacheError;
pub use crate::manager::{CacheManager, CacheStats};
pub use config::CacheConfig;
