//! Database health reporting
//!
//! A `SELECT 1` probe combined with the recent metric history gives a
//! healthy/degraded/unhealthy verdict plus hints for operators.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use type_mapping::Params;

use crate::core::QueryHaus;
use crate::metrics::PerformanceSummary;

const UNHEALTHY_RESPONSE: Duration = Duration::from_millis(2000);
const DEGRADED_RESPONSE: Duration = Duration::from_millis(1000);
const UNHEALTHY_ERROR_RATE: f64 = 0.1;
const DEGRADED_SLOW_OPERATIONS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub response_time_ms: u64,
    pub recommendations: Vec<String>,
    /// Probe failure, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub performance: PerformanceSummary,
    pub checked_at: DateTime<Utc>,
}

impl QueryHaus {
    /// Probe the database and classify its health
    pub async fn check_database_health(&self) -> HealthReport {
        let started = Instant::now();
        let probe = self.execute_query("SELECT 1 AS health", &Params::new()).await;
        let response_time = started.elapsed();

        let error = probe.err().map(|e| e.to_string());
        let performance = self.performance_summary();
        let (status, recommendations) = classify(error.is_some(), response_time, &performance);

        if status != HealthStatus::Healthy {
            tracing::warn!(?status, response_time_ms = response_time.as_millis() as u64, "Database health check");
        }

        HealthReport {
            status,
            response_time_ms: response_time.as_millis() as u64,
            recommendations,
            error,
            performance,
            checked_at: Utc::now(),
        }
    }
}

fn classify(
    probe_failed: bool,
    response_time: Duration,
    performance: &PerformanceSummary,
) -> (HealthStatus, Vec<String>) {
    let mut recommendations = Vec::new();

    if probe_failed {
        recommendations.push(
            "Database is unreachable: check server availability, credentials and network access"
                .to_string(),
        );
    }
    if response_time > UNHEALTHY_RESPONSE {
        recommendations.push(
            "Response time above 2000 ms: check server load and blocking queries".to_string(),
        );
    } else if response_time > DEGRADED_RESPONSE {
        recommendations.push(
            "Response time above 1000 ms: consider indexing or caching frequent queries"
                .to_string(),
        );
    }
    if performance.error_rate > UNHEALTHY_ERROR_RATE {
        recommendations.push(format!(
            "{:.1}% of recent operations failed: review query errors in the logs",
            performance.error_rate * 100.0
        ));
    }
    if performance.slow_operations > DEGRADED_SLOW_OPERATIONS {
        recommendations.push(format!(
            "{} slow operations recently: review slow query warnings and cache read-heavy data",
            performance.slow_operations
        ));
    }

    let status = if probe_failed
        || response_time > UNHEALTHY_RESPONSE
        || performance.error_rate > UNHEALTHY_ERROR_RATE
    {
        HealthStatus::Unhealthy
    } else if response_time > DEGRADED_RESPONSE
        || performance.slow_operations > DEGRADED_SLOW_OPERATIONS
    {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    if status == HealthStatus::Healthy {
        recommendations.push("Database performance is within normal limits".to_string());
    }

    (status, recommendations)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(error_rate: f64, slow_operations: usize) -> PerformanceSummary {
        PerformanceSummary {
            total_operations: 100,
            failed_operations: (error_rate * 100.0) as usize,
            error_rate,
            slow_operations,
            average_duration_ms: 20.0,
        }
    }

    #[test]
    fn test_healthy() {
        let (status, recs) = classify(false, Duration::from_millis(15), &summary(0.0, 0));
        assert_eq!(status, HealthStatus::Healthy);
        assert_eq!(recs.len(), 1);
    }

    #[test]
    fn test_response_time_thresholds() {
        let (status, _) = classify(false, Duration::from_millis(1500), &summary(0.0, 0));
        assert_eq!(status, HealthStatus::Degraded);

        let (status, recs) = classify(false, Duration::from_millis(2500), &summary(0.0, 0));
        assert_eq!(status, HealthStatus::Unhealthy);
        assert!(recs[0].contains("2000 ms"));
    }

    #[test]
    fn test_metric_history_thresholds() {
        let (status, _) = classify(false, Duration::from_millis(10), &summary(0.0, 6));
        assert_eq!(status, HealthStatus::Degraded);

        let (status, recs) = classify(false, Duration::from_millis(10), &summary(0.25, 0));
        assert_eq!(status, HealthStatus::Unhealthy);
        assert!(recs.iter().any(|r| r.starts_with("25.0%")));
    }

    #[test]
    fn test_probe_failure_is_unhealthy() {
        let (status, recs) = classify(true, Duration::from_millis(3), &summary(0.0, 0));
        assert_eq!(status, HealthStatus::Unhealthy);
        assert!(recs[0].contains("unreachable"));
    }
}
