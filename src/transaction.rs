//! Atomic batch execution
//!
//! This module runs a list of statements inside one transaction, so that
//! either all of them take effect or none do.

use serde_json::json;
use tokio::time::Instant;
use type_mapping::{Params, RowSet};

use crate::core::QueryHaus;
use crate::errors::QueryHausError;

/// One statement of a batch
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub text: String,
    pub params: Params,
}

impl Statement {
    pub fn new(text: impl Into<String>, params: Params) -> Self {
        Self {
            text: text.into(),
            params,
        }
    }

    /// Statement without parameters
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(text, Params::new())
    }
}

impl From<(&str, Params)> for Statement {
    fn from((text, params): (&str, Params)) -> Self {
        Self::new(text, params)
    }
}

impl From<(String, Params)> for Statement {
    fn from((text, params): (String, Params)) -> Self {
        Self::new(text, params)
    }
}

impl QueryHaus {
    /// Execute statements in order inside a single transaction.
    ///
    /// Returns each statement's rows in input order. On the first failure the
    /// whole transaction is rolled back and [`QueryHausError::Transaction`] is
    /// returned; nothing is retried.
    pub async fn execute_transaction(
        &self,
        statements: &[Statement],
    ) -> Result<Vec<RowSet>, QueryHausError> {
        if statements.is_empty() {
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let result = self.run_transaction(statements).await;
        let elapsed = started.elapsed();

        self.metrics.record(
            "transaction",
            elapsed,
            result.is_ok(),
            Some(json!({ "statements": statements.len() })),
        );
        if self.metrics.is_slow(elapsed) {
            tracing::warn!(
                statements = statements.len(),
                duration_ms = elapsed.as_millis() as u64,
                "Slow transaction detected"
            );
        }

        result
    }

    async fn run_transaction(&self, statements: &[Statement]) -> Result<Vec<RowSet>, QueryHausError> {
        let pool = self.get_connection().await?;
        let mut tx = pool.begin().await?;
        let mut results = Vec::with_capacity(statements.len());

        for (index, statement) in statements.iter().enumerate() {
            match tx.query(&statement.text, &statement.params).await {
                Ok(rows) => results.push(rows),
                Err(source) => {
                    if let Err(rollback_error) = tx.rollback().await {
                        tracing::error!(%rollback_error, "Rollback failed");
                    }
                    tracing::warn!(index, error = %source, "Transaction rolled back");
                    return Err(QueryHausError::Transaction {
                        index: Some(index),
                        source,
                    });
                }
            }
        }

        tx.commit()
            .await
            .map_err(|source| QueryHausError::Transaction {
                index: None,
                source,
            })?;
        Ok(results)
    }
}
