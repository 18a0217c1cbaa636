//! Cache manager implementation
//!
//! This module provides the in-process CacheManager: a TTL map for query
//! results with lazy expiry on read and a periodic background sweep.

use crate::errors::CacheError;
use config::CacheConfig;
use serde::Serialize;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::fmt::Debug;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    ttl_seconds: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at).as_millis()
            > u128::from(self.ttl_seconds) * 1000
    }
}

/// Entry counts at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// All stored entries, including expired ones not yet purged
    pub entries: usize,
    pub live_entries: usize,
}

/// In-memory cache manager.
///
/// Scoped to one process: separate processes keep independent caches.
pub struct CacheManager<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    config: CacheConfig,
}

impl<V> Debug for CacheManager<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entry_count = match self.entries.try_read() {
            Ok(entries) => entries.len().to_string(),
            Err(_) => "locked".to_string(),
        };

        f.debug_struct("CacheManager")
            .field("config", &self.config)
            .field("entries", &entry_count)
            .finish()
    }
}

impl<V> CacheManager<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a new cache manager
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Generate cache key for an ad-hoc query
    pub fn query_key<P: Serialize>(text: &str, params: &P) -> Result<String, CacheError> {
        let encoded = serde_json::to_string(params)?;
        Ok(format!("query:{}", hash_parts(&[text, &encoded])))
    }

    /// Generate cache key for a stored procedure call
    pub fn procedure_key<P: Serialize>(name: &str, params: &P) -> Result<String, CacheError> {
        let encoded = serde_json::to_string(params)?;
        Ok(format!("sp:{}:{}", name, hash_parts(&[&encoded])))
    }

    /// Get a live entry, dropping it if it has expired
    pub async fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
        }
        None
    }

    /// Effective TTL for a write: the given value or the configured default.
    /// Zero is rejected.
    pub fn resolve_ttl(&self, ttl_seconds: Option<u64>) -> Result<u64, CacheError> {
        match ttl_seconds.unwrap_or(self.config.default_ttl_seconds) {
            0 => Err(CacheError::InvalidTtl(0)),
            ttl => Ok(ttl),
        }
    }

    /// Store a value. `ttl_seconds` falls back to the configured default.
    pub async fn set(&self, key: &str, value: V, ttl_seconds: Option<u64>) -> Result<(), CacheError> {
        let ttl_seconds = self.resolve_ttl(ttl_seconds)?;

        let entry = CacheEntry {
            value,
            inserted_at: Instant::now(),
            ttl_seconds,
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    /// Remove entries whose key contains `pattern`, or everything when `None`.
    /// Returns the number of entries removed.
    pub async fn clear(&self, pattern: Option<&str>) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        match pattern {
            Some(pattern) => entries.retain(|key, _| !key.contains(pattern)),
            None => entries.clear(),
        }
        before - entries.len()
    }

    /// Drop every expired entry. Returns the number removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    pub async fn contains(&self, key: &str) -> bool {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(Instant::now()))
    }

    pub async fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let entries = self.entries.read().await;
        CacheStats {
            entries: entries.len(),
            live_entries: entries.values().filter(|e| !e.is_expired(now)).count(),
        }
    }

    /// Start the periodic purge on the current Tokio runtime.
    ///
    /// The task ends on its own once the manager is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let interval = self.config.sweep_interval();
        let manager = Arc::downgrade(self);
        tokio::spawn(sweep_loop(manager, interval))
    }

    /// Get current configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

async fn sweep_loop<V>(manager: Weak<CacheManager<V>>, period: Duration)
where
    V: Clone + Send + Sync + 'static,
{
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(manager) = manager.upgrade() else {
            break;
        };
        let purged = manager.purge_expired().await;
        if purged > 0 {
            tracing::debug!(purged, "Purged expired cache entries");
        }
    }
}

/// Generate a hex hash over the given parts
fn hash_parts(parts: &[&str]) -> String {
    let mut hasher = DefaultHasher::new();
    for part in parts {
        part.hash(&mut hasher);
    }
    format!("{:x}", hasher.finish())
}
