//! Core QueryHaus functionality
//!
//! This module contains the main QueryHaus struct and its implementation,
//! providing centralized coordination for connections, query execution,
//! caching and metrics.

use std::future::Future;
use std::sync::{Arc, Mutex};

use cache_system::{CacheManager, CacheStats};
use config::AppConfig;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use type_mapping::{Params, RowSet};

use crate::connection::ConnectionManager;
use crate::driver::{Driver, Pool, TdsDriver};
use crate::errors::QueryHausError;
use crate::metrics::{MetricsRecorder, PerformanceMetric, PerformanceSummary};

/// Statement text kept in logs and metric details
const STATEMENT_PREVIEW_CHARS: usize = 100;

/// Number of recent metric records summarized for dashboards
pub(crate) const RECENT_WINDOW: usize = 100;

/// Main QueryHaus coordinator that owns the pool handle, query cache and metrics
pub struct QueryHaus {
    connections: ConnectionManager,
    cache: Arc<CacheManager<RowSet>>,
    pub(crate) metrics: MetricsRecorder,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    config: AppConfig,
}

impl std::fmt::Debug for QueryHaus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryHaus")
            .field("connections", &self.connections)
            .field("cache", &self.cache)
            .field("metrics", &self.metrics)
            .finish()
    }
}

impl QueryHaus {
    /// Create a client over the given driver. No connection is made until
    /// the first query.
    ///
    /// When called inside a Tokio runtime the cache sweeper starts right away.
    pub fn new(config: AppConfig, driver: Arc<dyn Driver>) -> Self {
        let connections =
            ConnectionManager::new(driver, config.database.clone(), config.retry.clone());
        let cache = Arc::new(CacheManager::new(config.cache.clone()));
        let metrics = MetricsRecorder::new(&config.metrics);

        let sweeper = match tokio::runtime::Handle::try_current() {
            Ok(_) => Some(cache.spawn_sweeper()),
            Err(_) => {
                tracing::warn!("No Tokio runtime, expired cache entries are only purged on read");
                None
            }
        };

        Self {
            connections,
            cache,
            metrics,
            sweeper: Mutex::new(sweeper),
            config,
        }
    }

    /// Create a client for SQL Server
    pub fn with_sql_server(config: AppConfig) -> Result<Self, QueryHausError> {
        config.validate()?;
        Ok(Self::new(config, Arc::new(TdsDriver)))
    }

    /// Create a SQL Server client configured from `DB_*` environment variables
    pub fn from_env() -> Result<Self, QueryHausError> {
        Self::with_sql_server(AppConfig::from_env()?)
    }

    /// Get a live pool handle, connecting (with retries) if needed
    pub async fn get_connection(&self) -> Result<Arc<dyn Pool>, QueryHausError> {
        self.connections.get_connection().await
    }

    pub fn is_connected(&self) -> bool {
        self.connections.is_connected()
    }

    /// Execute parameterized query text
    pub async fn execute_query(&self, text: &str, params: &Params) -> Result<RowSet, QueryHausError> {
        crate::trace_log!("Executing query: {}", text);
        self.timed("query", text, async {
            type_mapping::validate_params(params)?;
            let pool = self.get_connection().await?;
            Ok::<_, QueryHausError>(pool.query(text, params).await?)
        })
        .await
    }

    /// Execute a stored procedure
    pub async fn execute_procedure(
        &self,
        name: &str,
        params: &Params,
    ) -> Result<RowSet, QueryHausError> {
        crate::trace_log!("Executing procedure: {}", name);
        self.timed("procedure", name, async {
            type_mapping::quote_object_name(name)?;
            type_mapping::validate_params(params)?;
            let pool = self.get_connection().await?;
            Ok::<_, QueryHausError>(pool.procedure(name, params).await?)
        })
        .await
    }

    /// Execute query text, serving repeated calls from the cache until the TTL passes.
    ///
    /// `cache_key` defaults to a hash of the text and parameters; `ttl_seconds`
    /// defaults to the configured TTL.
    pub async fn execute_query_cached(
        &self,
        text: &str,
        params: &Params,
        cache_key: Option<&str>,
        ttl_seconds: Option<u64>,
    ) -> Result<RowSet, QueryHausError> {
        let key = match cache_key {
            Some(key) => key.to_string(),
            None => CacheManager::<RowSet>::query_key(text, params)?,
        };
        self.cached(key, ttl_seconds, self.execute_query(text, params))
            .await
    }

    /// Stored procedure counterpart of [`QueryHaus::execute_query_cached`]
    pub async fn execute_procedure_cached(
        &self,
        name: &str,
        params: &Params,
        cache_key: Option<&str>,
        ttl_seconds: Option<u64>,
    ) -> Result<RowSet, QueryHausError> {
        let key = match cache_key {
            Some(key) => key.to_string(),
            None => CacheManager::<RowSet>::procedure_key(name, params)?,
        };
        self.cached(key, ttl_seconds, self.execute_procedure(name, params))
            .await
    }

    /// Remove cached results whose key contains `pattern`, or all of them.
    /// Returns how many were removed.
    pub async fn clear_cache(&self, pattern: Option<&str>) -> usize {
        let removed = self.cache.clear(pattern).await;
        tracing::debug!(pattern = pattern.unwrap_or("*"), removed, "Cleared query cache");
        removed
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    /// Summary of the most recent operations
    pub fn performance_summary(&self) -> PerformanceSummary {
        self.metrics.summary(RECENT_WINDOW)
    }

    /// Up to `limit` most recent metric records, oldest first
    pub fn recent_metrics(&self, limit: usize) -> Vec<PerformanceMetric> {
        self.metrics.recent(limit)
    }

    pub fn clear_metrics(&self) {
        self.metrics.clear();
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Close the pool and stop the cache sweeper
    pub async fn shutdown(&self) {
        let sweeper = self.sweeper.lock().ok().and_then(|mut sweeper| sweeper.take());
        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
        self.connections.close().await;
    }

    /// Wait for Ctrl-C, then shut down
    pub async fn shutdown_on_signal(&self) -> Result<(), QueryHausError> {
        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutdown signal received, closing database connections");
        self.shutdown().await;
        Ok(())
    }

    async fn cached<F>(
        &self,
        key: String,
        ttl_seconds: Option<u64>,
        load: F,
    ) -> Result<RowSet, QueryHausError>
    where
        F: Future<Output = Result<RowSet, QueryHausError>>,
    {
        // Reject a bad TTL before the statement runs
        let ttl_seconds = self.cache.resolve_ttl(ttl_seconds)?;

        if let Some(rows) = self.cache.get(&key).await {
            crate::debug_log!("Cache hit: {}", key);
            return Ok(rows);
        }

        crate::debug_log!("Cache miss: {}", key);
        let rows = load.await?;
        self.cache.set(&key, rows.clone(), Some(ttl_seconds)).await?;
        Ok(rows)
    }

    /// Run `op`, recording a metric and flagging it when slow
    pub(crate) async fn timed<T, F>(
        &self,
        operation: &'static str,
        statement: &str,
        op: F,
    ) -> Result<T, QueryHausError>
    where
        F: Future<Output = Result<T, QueryHausError>>,
    {
        let started = Instant::now();
        let result = op.await;
        let elapsed = started.elapsed();

        let preview = statement_preview(statement);
        self.metrics.record(
            operation,
            elapsed,
            result.is_ok(),
            Some(json!({ "statement": preview })),
        );

        if self.metrics.is_slow(elapsed) {
            tracing::warn!(
                operation,
                duration_ms = elapsed.as_millis() as u64,
                statement = %preview,
                "Slow {} detected",
                operation
            );
        }
        if let Err(error) = &result {
            tracing::error!(operation, statement = %preview, %error, "Database operation failed");
        }

        result
    }
}

impl Drop for QueryHaus {
    fn drop(&mut self) {
        if let Ok(mut sweeper) = self.sweeper.lock() {
            if let Some(sweeper) = sweeper.take() {
                sweeper.abort();
            }
        }
    }
}

fn statement_preview(statement: &str) -> String {
    let mut chars = statement.chars();
    let preview: String = chars.by_ref().take(STATEMENT_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", preview)
    } else {
        preview
    }
}
