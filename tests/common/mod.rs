//! Scripted in-memory driver shared by the integration tests
//!
//! Statements containing `FAIL` return an error. Statements starting with
//! `INSERT` are recorded as applied: immediately outside a transaction, on
//! commit inside one.

#![allow(dead_code)]

use async_trait::async_trait;
use queryhaus::prelude::*;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

#[derive(Default)]
pub struct MockState {
    pub connect_calls: AtomicUsize,
    pub failing_connects: AtomicUsize,
    pub connect_delay: Mutex<Duration>,
    pub query_calls: AtomicUsize,
    pub query_delay: Mutex<Duration>,
    pub applied: Mutex<Vec<String>>,
    pub rollbacks: AtomicUsize,
    pub pools: Mutex<Vec<Arc<MockPool>>>,
}

#[derive(Clone, Default)]
pub struct MockDriver {
    pub state: Arc<MockState>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` connection attempts fail
    pub fn fail_next_connects(&self, n: usize) {
        self.state.failing_connects.store(n, Ordering::SeqCst);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.state.connect_delay.lock().unwrap() = delay;
    }

    pub fn set_query_delay(&self, delay: Duration) {
        *self.state.query_delay.lock().unwrap() = delay;
    }

    pub fn connect_calls(&self) -> usize {
        self.state.connect_calls.load(Ordering::SeqCst)
    }

    pub fn query_calls(&self) -> usize {
        self.state.query_calls.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.state.rollbacks.load(Ordering::SeqCst)
    }

    pub fn applied(&self) -> Vec<String> {
        self.state.applied.lock().unwrap().clone()
    }

    pub fn pool(&self, index: usize) -> Arc<MockPool> {
        Arc::clone(&self.state.pools.lock().unwrap()[index])
    }

    /// Client over this driver with fast retries
    pub fn client(&self) -> QueryHaus {
        let mut config = AppConfig::default();
        config.retry = RetryConfig::new(3, 100, 400);
        QueryHaus::new(config, Arc::new(self.clone()))
    }
}

#[async_trait]
impl Driver for MockDriver {
    async fn connect(&self, _config: &DatabaseConfig) -> Result<Arc<dyn Pool>, DriverError> {
        self.state.connect_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.state.connect_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let failing = self.state.failing_connects.load(Ordering::SeqCst);
        if failing > 0 {
            self.state.failing_connects.store(failing - 1, Ordering::SeqCst);
            return Err(DriverError::Other("connection refused".to_string()));
        }

        let mut pools = self.state.pools.lock().unwrap();
        let pool = Arc::new(MockPool {
            id: pools.len(),
            connected: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            listeners: Mutex::new(Vec::new()),
            state: Arc::clone(&self.state),
        });
        pools.push(Arc::clone(&pool));
        Ok(pool)
    }
}

pub struct MockPool {
    pub id: usize,
    pub connected: AtomicBool,
    pub closed: AtomicBool,
    listeners: Mutex<Vec<ErrorListener>>,
    state: Arc<MockState>,
}

impl MockPool {
    /// Simulate the driver reporting a dropped connection
    pub fn emit_error(&self) {
        let error = DriverError::Other("connection reset by peer".to_string());
        for listener in self.listeners.lock().unwrap().iter() {
            listener(&error);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn run(&self, text: &str, params: &Params) -> Result<RowSet, DriverError> {
        self.state.query_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.state.query_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if text.contains("FAIL") {
            return Err(DriverError::Other(format!("statement failed: {}", text)));
        }

        let row = json!({ "statement": text, "params": params });
        Ok(vec![row.as_object().cloned().unwrap_or_default()])
    }
}

#[async_trait]
impl Pool for MockPool {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn on_error(&self, listener: ErrorListener) {
        self.listeners.lock().unwrap().push(listener);
    }

    async fn query(&self, text: &str, params: &Params) -> Result<RowSet, DriverError> {
        let rows = self.run(text, params).await?;
        if text.starts_with("INSERT") {
            self.state.applied.lock().unwrap().push(text.to_string());
        }
        Ok(rows)
    }

    async fn procedure(&self, name: &str, params: &Params) -> Result<RowSet, DriverError> {
        self.run(name, params).await
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>, DriverError> {
        Ok(Box::new(MockTransaction {
            pending: Vec::new(),
            pool_state: Arc::clone(&self.state),
            pool_id: self.id,
        }))
    }

    async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub struct MockTransaction {
    pending: Vec<String>,
    pool_state: Arc<MockState>,
    pool_id: usize,
}

#[async_trait]
impl Transaction for MockTransaction {
    async fn query(&mut self, text: &str, params: &Params) -> Result<RowSet, DriverError> {
        self.pool_state.query_calls.fetch_add(1, Ordering::SeqCst);
        if text.contains("FAIL") {
            return Err(DriverError::Other(format!("statement failed: {}", text)));
        }
        if text.starts_with("INSERT") {
            self.pending.push(text.to_string());
        }
        let row = json!({ "statement": text, "params": params, "pool": self.pool_id });
        Ok(vec![row.as_object().cloned().unwrap_or_default()])
    }

    async fn commit(self: Box<Self>) -> Result<(), DriverError> {
        self.pool_state
            .applied
            .lock()
            .unwrap()
            .extend(self.pending.iter().cloned());
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DriverError> {
        self.pool_state.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Counts log events whose message contains a fragment
pub struct MessageCounter {
    fragment: &'static str,
    count: Arc<AtomicUsize>,
}

impl MessageCounter {
    pub fn new(fragment: &'static str) -> (Self, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        (
            Self {
                fragment,
                count: Arc::clone(&count),
            },
            count,
        )
    }
}

struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{:?}", value);
        }
    }
}

impl<S: Subscriber> Layer<S> for MessageCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor(String::new());
        event.record(&mut visitor);
        if visitor.0.contains(self.fragment) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }
}
