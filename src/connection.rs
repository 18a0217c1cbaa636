//! Connection management
//!
//! Holds the current pool handle, connects lazily on first use, and retries
//! failed connection attempts with exponential backoff. Concurrent callers
//! that arrive while a connection is being established wait for that attempt
//! instead of starting their own.

use crate::driver::{Driver, DriverError, ErrorListener, Pool};
use crate::errors::QueryHausError;
use config::{DatabaseConfig, RetryConfig};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::Mutex;

struct Slot {
    generation: u64,
    pool: Arc<dyn Pool>,
}

type SharedSlot = Arc<RwLock<Option<Slot>>>;

// A panic while holding the slot cannot leave it half-written, so a
// poisoned lock is still safe to use.
fn read_slot(slot: &RwLock<Option<Slot>>) -> RwLockReadGuard<'_, Option<Slot>> {
    slot.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_slot(slot: &RwLock<Option<Slot>>) -> RwLockWriteGuard<'_, Option<Slot>> {
    slot.write().unwrap_or_else(PoisonError::into_inner)
}

/// Owner of the pool handle
pub struct ConnectionManager {
    driver: Arc<dyn Driver>,
    config: DatabaseConfig,
    retry: RetryConfig,
    slot: SharedSlot,
    connect_lock: Mutex<()>,
    generation: AtomicU64,
    retry_count: AtomicU32,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("target", &self.config.target())
            .field("connected", &self.is_connected())
            .field("retry_count", &self.retry_count())
            .finish()
    }
}

impl ConnectionManager {
    pub fn new(driver: Arc<dyn Driver>, config: DatabaseConfig, retry: RetryConfig) -> Self {
        Self {
            driver,
            config,
            retry,
            slot: Arc::new(RwLock::new(None)),
            connect_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
            retry_count: AtomicU32::new(0),
        }
    }

    /// Get a live pool, connecting if there is none
    pub async fn get_connection(&self) -> Result<Arc<dyn Pool>, QueryHausError> {
        if let Some(pool) = self.live_pool() {
            return Ok(pool);
        }

        let _connecting = self.connect_lock.lock().await;

        // Whoever held the lock may have connected already
        if let Some(pool) = self.live_pool() {
            return Ok(pool);
        }

        self.discard_stale().await;
        let pool = self.connect_with_retry().await?;
        self.install(Arc::clone(&pool));
        Ok(pool)
    }

    /// Whether a connected pool is currently held
    pub fn is_connected(&self) -> bool {
        self.live_pool().is_some()
    }

    /// Failed attempts made by the most recent connection cycle
    pub fn retry_count(&self) -> u32 {
        self.retry_count.load(Ordering::SeqCst)
    }

    /// Close and forget the current pool. The next call reconnects.
    pub async fn close(&self) {
        let _connecting = self.connect_lock.lock().await;
        let current = write_slot(&self.slot).take();
        if let Some(current) = current {
            current.pool.close().await;
            tracing::info!(server = %self.config.target(), "Database pool closed");
        }
    }

    fn live_pool(&self) -> Option<Arc<dyn Pool>> {
        read_slot(&self.slot)
            .as_ref()
            .filter(|current| current.pool.is_connected())
            .map(|current| Arc::clone(&current.pool))
    }

    async fn discard_stale(&self) {
        let stale = write_slot(&self.slot).take();
        if let Some(stale) = stale {
            crate::debug_log!("Closing stale pool generation {}", stale.generation);
            stale.pool.close().await;
        }
    }

    async fn connect_with_retry(&self) -> Result<Arc<dyn Pool>, QueryHausError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.driver.connect(&self.config).await {
                Ok(pool) => {
                    tracing::info!(server = %self.config.target(), attempt, "Connected to database");
                    self.retry_count.store(attempt - 1, Ordering::SeqCst);
                    return Ok(pool);
                }
                Err(error) if attempt >= max_attempts => {
                    tracing::error!(
                        server = %self.config.target(),
                        attempts = attempt,
                        %error,
                        "Giving up connecting to database"
                    );
                    self.retry_count.store(attempt, Ordering::SeqCst);
                    return Err(QueryHausError::Connection {
                        attempts: attempt,
                        source: error,
                    });
                }
                Err(error) => {
                    let delay = self.retry.backoff(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        retry_in_ms = delay.as_millis() as u64,
                        %error,
                        "Database connection attempt failed"
                    );
                    self.retry_count.store(attempt, Ordering::SeqCst);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn install(&self, pool: Arc<dyn Pool>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        pool.on_error(invalidate_on_error(Arc::downgrade(&self.slot), generation));

        *write_slot(&self.slot) = Some(Slot { generation, pool });
    }
}

/// Listener that drops the handle if it still belongs to `generation`
fn invalidate_on_error(
    slot: std::sync::Weak<RwLock<Option<Slot>>>,
    generation: u64,
) -> ErrorListener {
    Arc::new(move |error: &DriverError| {
        let Some(shared) = slot.upgrade() else {
            return;
        };
        let mut slot = write_slot(&shared);
        if slot.as_ref().is_some_and(|current| current.generation == generation) {
            tracing::warn!(%error, "Database pool reported an error, dropping handle");
            *slot = None;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::driver::Transaction;
    use std::sync::atomic::AtomicUsize;
    use type_mapping::{Params, RowSet};

    struct StaticPool;

    #[async_trait]
    impl Pool for StaticPool {
        fn is_connected(&self) -> bool {
            true
        }

        fn on_error(&self, _listener: ErrorListener) {}

        async fn query(&self, _text: &str, _params: &Params) -> Result<RowSet, DriverError> {
            Ok(Vec::new())
        }

        async fn procedure(&self, _name: &str, _params: &Params) -> Result<RowSet, DriverError> {
            Ok(Vec::new())
        }

        async fn begin(&self) -> Result<Box<dyn Transaction>, DriverError> {
            Err(DriverError::Other("not supported".to_string()))
        }

        async fn close(&self) {}
    }

    #[derive(Default)]
    struct CountingDriver {
        connects: AtomicUsize,
    }

    #[async_trait]
    impl Driver for CountingDriver {
        async fn connect(&self, _config: &DatabaseConfig) -> Result<Arc<dyn Pool>, DriverError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(StaticPool))
        }
    }

    #[tokio::test]
    async fn test_poisoned_slot_still_holds_the_pool() {
        let driver = Arc::new(CountingDriver::default());
        let manager = ConnectionManager::new(
            driver.clone(),
            DatabaseConfig::default(),
            RetryConfig::default(),
        );

        let slot = Arc::clone(&manager.slot);
        let _ = std::thread::spawn(move || {
            let _guard = slot.write().unwrap();
            panic!("poison the slot");
        })
        .join();
        assert!(manager.slot.is_poisoned());

        let first = manager.get_connection().await.unwrap();
        let second = manager.get_connection().await.unwrap();

        assert!(manager.is_connected());
        assert_eq!(driver.connects.load(Ordering::SeqCst), 1);
        assert_eq!(Arc::as_ptr(&first) as *const (), Arc::as_ptr(&second) as *const ());
    }
}
