//! Cache failures
//!
//! The cache lives in process memory, so the only failures are bad input:
//! parameters that cannot be encoded into a key, or a zero TTL.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    /// Parameters could not be encoded while deriving a key
    #[error("Cannot derive cache key: {0}")]
    KeyEncoding(#[from] serde_json::Error),

    #[error("Invalid TTL value: {0} (must be at least 1 second)")]
    InvalidTtl(u64),
}
