//! Performance metrics
//!
//! A bounded in-memory log of database operations. It is an observability
//! aid for dashboards and the health check, reset on restart.

use chrono::{DateTime, Utc};
use config::MetricsConfig;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// One recorded operation
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceMetric {
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub duration_ms: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Aggregate over the most recent records
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub total_operations: usize,
    pub failed_operations: usize,
    /// Fraction in `0.0..=1.0`
    pub error_rate: f64,
    pub slow_operations: usize,
    pub average_duration_ms: f64,
}

/// Ring buffer of performance metrics
pub struct MetricsRecorder {
    records: Mutex<VecDeque<PerformanceMetric>>,
    capacity: usize,
    slow_threshold: Duration,
}

impl std::fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRecorder")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("slow_threshold", &self.slow_threshold)
            .finish()
    }
}

impl MetricsRecorder {
    pub fn new(config: &MetricsConfig) -> Self {
        let capacity = config.capacity.max(1);
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            slow_threshold: config.slow_threshold(),
        }
    }

    /// Append a record, dropping the oldest once full
    pub fn record(
        &self,
        operation: &str,
        duration: Duration,
        success: bool,
        details: Option<serde_json::Value>,
    ) {
        let metric = PerformanceMetric {
            timestamp: Utc::now(),
            operation: operation.to_string(),
            duration_ms: duration.as_millis() as u64,
            success,
            details,
        };

        if let Ok(mut records) = self.records.lock() {
            if records.len() == self.capacity {
                records.pop_front();
            }
            records.push_back(metric);
        }
    }

    pub fn is_slow(&self, duration: Duration) -> bool {
        duration > self.slow_threshold
    }

    pub fn slow_threshold(&self) -> Duration {
        self.slow_threshold
    }

    /// Up to `limit` most recent records, oldest first
    pub fn recent(&self, limit: usize) -> Vec<PerformanceMetric> {
        self.records
            .lock()
            .map(|records| {
                let skip = records.len().saturating_sub(limit);
                records.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
    }

    /// Summarize the `window` most recent records
    pub fn summary(&self, window: usize) -> PerformanceSummary {
        let recent = self.recent(window);
        if recent.is_empty() {
            return PerformanceSummary::default();
        }

        let threshold_ms = self.slow_threshold.as_millis() as u64;
        let total = recent.len();
        let failed = recent.iter().filter(|m| !m.success).count();
        let slow = recent.iter().filter(|m| m.duration_ms > threshold_ms).count();
        let total_ms: u64 = recent.iter().map(|m| m.duration_ms).sum();

        PerformanceSummary {
            total_operations: total,
            failed_operations: failed,
            error_rate: failed as f64 / total as f64,
            slow_operations: slow,
            average_duration_ms: total_ms as f64 / total as f64,
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut records) = self.records.lock() {
            records.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(capacity: usize) -> MetricsRecorder {
        MetricsRecorder::new(&MetricsConfig::new(capacity, 1000))
    }

    #[test]
    fn test_ring_buffer_drops_oldest() {
        let metrics = recorder(3);
        for name in ["a", "b", "c", "d"] {
            metrics.record(name, Duration::from_millis(5), true, None);
        }

        let ops: Vec<String> = metrics.recent(10).into_iter().map(|m| m.operation).collect();
        assert_eq!(ops, vec!["b", "c", "d"]);
    }

    #[test]
    fn test_summary_window() {
        let metrics = recorder(100);
        metrics.record("query", Duration::from_millis(1500), true, None);
        metrics.record("query", Duration::from_millis(100), false, None);
        metrics.record("query", Duration::from_millis(200), true, None);
        metrics.record("query", Duration::from_millis(200), false, None);

        let all = metrics.summary(100);
        assert_eq!(all.total_operations, 4);
        assert_eq!(all.failed_operations, 2);
        assert_eq!(all.error_rate, 0.5);
        assert_eq!(all.slow_operations, 1);
        assert_eq!(all.average_duration_ms, 500.0);

        let last_two = metrics.summary(2);
        assert_eq!(last_two.total_operations, 2);
        assert_eq!(last_two.slow_operations, 0);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let metrics = recorder(10);
        assert!(!metrics.is_slow(Duration::from_millis(1000)));
        assert!(metrics.is_slow(Duration::from_millis(1001)));
    }

    #[test]
    fn test_empty_summary() {
        let metrics = recorder(10);
        assert_eq!(metrics.summary(100), PerformanceSummary::default());
        metrics.record("query", Duration::ZERO, true, None);
        metrics.clear();
        assert!(metrics.is_empty());
    }
}
