//! SQL Server driver over TDS
//!
//! A small checkout pool of `tiberius` clients: a semaphore bounds the number
//! of connections in use, idle clients are reused, and any connection-level
//! failure marks the whole pool disconnected so the connection manager
//! replaces it.

use super::{Driver, DriverError, ErrorListener, Pool, Transaction};
use async_trait::async_trait;
use config::DatabaseConfig;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tiberius::{AuthMethod, Client, ColumnData, EncryptionLevel, FromSql, Query};
use tokio::net::TcpStream;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use type_mapping::{
    PreparedStatement, Row, RowSet, SqlValue, build_procedure_call, build_query,
};

type TdsClient = Client<Compat<TcpStream>>;

/// Driver for SQL Server
#[derive(Debug, Default, Clone, Copy)]
pub struct TdsDriver;

#[async_trait]
impl Driver for TdsDriver {
    async fn connect(&self, config: &DatabaseConfig) -> Result<Arc<dyn Pool>, DriverError> {
        let pool = TdsPool::open(config).await?;
        Ok(Arc::new(pool))
    }
}

struct PoolShared {
    tds_config: tiberius::Config,
    target: String,
    connect_timeout: Duration,
    request_timeout: Duration,
    idle: Mutex<Vec<TdsClient>>,
    permits: Arc<Semaphore>,
    connected: AtomicBool,
    listeners: RwLock<Vec<ErrorListener>>,
}

/// Pool of SQL Server connections
pub struct TdsPool {
    shared: Arc<PoolShared>,
}

impl std::fmt::Debug for TdsPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let idle = self.shared.idle.lock().map(|idle| idle.len()).unwrap_or(0);
        f.debug_struct("TdsPool")
            .field("target", &self.shared.target)
            .field("connected", &self.is_connected())
            .field("idle", &idle)
            .field("available", &self.shared.permits.available_permits())
            .finish()
    }
}

impl TdsPool {
    /// Open a pool, establishing `min_connections` (at least one) up front
    pub async fn open(config: &DatabaseConfig) -> Result<Self, DriverError> {
        let shared = Arc::new(PoolShared {
            tds_config: tds_config(config),
            target: config.target(),
            connect_timeout: config.connect_timeout(),
            request_timeout: config.request_timeout(),
            idle: Mutex::new(Vec::new()),
            permits: Arc::new(Semaphore::new(config.max_connections.max(1) as usize)),
            connected: AtomicBool::new(true),
            listeners: RwLock::new(Vec::new()),
        });

        let warm = config.min_connections.max(1);
        let mut clients = Vec::with_capacity(warm as usize);
        for _ in 0..warm {
            clients.push(shared.open_client().await?);
        }
        if let Ok(mut idle) = shared.idle.lock() {
            idle.extend(clients);
        }

        tracing::info!(server = %shared.target, connections = warm, "Opened SQL Server pool");
        Ok(Self { shared })
    }
}

fn tds_config(config: &DatabaseConfig) -> tiberius::Config {
    let mut tds = tiberius::Config::new();
    tds.host(&config.host);
    tds.port(config.port);
    tds.database(&config.database);
    tds.application_name("queryhaus");
    tds.authentication(AuthMethod::sql_server(&config.username, &config.password));
    if config.encrypt {
        tds.encryption(EncryptionLevel::Required);
    } else {
        tds.encryption(EncryptionLevel::NotSupported);
    }
    if config.trust_server_certificate {
        tds.trust_cert();
    }
    tds
}

impl PoolShared {
    async fn open_client(&self) -> Result<TdsClient, DriverError> {
        let connect = async {
            let tcp = TcpStream::connect(self.tds_config.get_addr()).await?;
            tcp.set_nodelay(true)?;

            match Client::connect(self.tds_config.clone(), tcp.compat_write()).await {
                Ok(client) => Ok::<_, DriverError>(client),
                // Azure SQL gateways redirect to the actual node
                Err(tiberius::error::Error::Routing { host, port }) => {
                    let mut redirected = self.tds_config.clone();
                    redirected.host(&host);
                    redirected.port(port);

                    let tcp = TcpStream::connect(redirected.get_addr()).await?;
                    tcp.set_nodelay(true)?;
                    Ok(Client::connect(redirected, tcp.compat_write()).await?)
                }
                Err(e) => Err(DriverError::from(e)),
            }
        };

        with_timeout("connect", self.connect_timeout, connect).await
    }

    async fn checkout(self: &Arc<Self>) -> Result<PooledClient, DriverError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(DriverError::PoolClosed);
        }

        let permit = tokio::time::timeout(self.connect_timeout, self.permits.clone().acquire_owned())
            .await
            .map_err(|_| DriverError::Timeout {
                operation: "connection checkout",
                timeout: self.connect_timeout,
            })?
            .map_err(|_| DriverError::PoolClosed)?;

        let reused = self.idle.lock().ok().and_then(|mut idle| idle.pop());
        let client = match reused {
            Some(client) => client,
            None => match self.open_client().await {
                Ok(client) => client,
                Err(e) => {
                    self.report(&e);
                    return Err(e);
                }
            },
        };

        Ok(PooledClient {
            client: Some(client),
            shared: Arc::clone(self),
            healthy: true,
            _permit: permit,
        })
    }

    /// Mark the pool disconnected and notify listeners, once
    fn report(&self, error: &DriverError) {
        if !error.is_connection_error() {
            return;
        }
        if self.connected.swap(false, Ordering::SeqCst) {
            tracing::warn!(server = %self.target, %error, "SQL Server connection lost");
            if let Ok(listeners) = self.listeners.read() {
                for listener in listeners.iter() {
                    listener(error);
                }
            }
        }
    }
}

/// A checked-out client, returned to the idle list on drop while healthy
struct PooledClient {
    client: Option<TdsClient>,
    shared: Arc<PoolShared>,
    healthy: bool,
    _permit: OwnedSemaphorePermit,
}

impl PooledClient {
    async fn run(&mut self, statement: &PreparedStatement) -> Result<RowSet, DriverError> {
        let timeout = self.shared.request_timeout;
        let client = self.client.as_mut().ok_or(DriverError::PoolClosed)?;

        let mut query = Query::new(statement.sql.as_str());
        for value in &statement.binds {
            bind_value(&mut query, value);
        }

        let result = with_timeout("query", timeout, async move {
            let stream = query.query(client).await?;
            Ok::<_, DriverError>(stream.into_first_result().await?)
        })
        .await;

        match result {
            Ok(rows) => Ok(rows.into_iter().map(row_to_json).collect()),
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn simple(&mut self, sql: &str) -> Result<(), DriverError> {
        let timeout = self.shared.request_timeout;
        let client = self.client.as_mut().ok_or(DriverError::PoolClosed)?;

        let result = with_timeout("query", timeout, async move {
            client.simple_query(sql).await?.into_results().await?;
            Ok::<_, DriverError>(())
        })
        .await;

        result.map_err(|e| self.fail(e))
    }

    fn fail(&mut self, error: DriverError) -> DriverError {
        // A timed out request leaves the stream mid-response
        if error.is_connection_error() || matches!(error, DriverError::Timeout { .. }) {
            self.healthy = false;
        }
        self.shared.report(&error);
        error
    }
}

impl Drop for PooledClient {
    fn drop(&mut self) {
        if !self.healthy || !self.shared.connected.load(Ordering::SeqCst) {
            return;
        }
        if let Some(client) = self.client.take() {
            if let Ok(mut idle) = self.shared.idle.lock() {
                idle.push(client);
            }
        }
    }
}

#[async_trait]
impl Pool for TdsPool {
    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn on_error(&self, listener: ErrorListener) {
        if let Ok(mut listeners) = self.shared.listeners.write() {
            listeners.push(listener);
        }
    }

    async fn query(&self, text: &str, params: &type_mapping::Params) -> Result<RowSet, DriverError> {
        let statement = build_query(text, params)?;
        let mut conn = self.shared.checkout().await?;
        conn.run(&statement).await
    }

    async fn procedure(
        &self,
        name: &str,
        params: &type_mapping::Params,
    ) -> Result<RowSet, DriverError> {
        let statement = build_procedure_call(name, params)?;
        let mut conn = self.shared.checkout().await?;
        conn.run(&statement).await
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>, DriverError> {
        let mut conn = self.shared.checkout().await?;
        conn.simple("BEGIN TRANSACTION").await?;
        Ok(Box::new(TdsTransaction {
            conn,
            finished: false,
        }))
    }

    async fn close(&self) {
        self.shared.connected.store(false, Ordering::SeqCst);
        self.shared.permits.close();

        let clients: Vec<TdsClient> = self
            .shared
            .idle
            .lock()
            .map(|mut idle| idle.drain(..).collect())
            .unwrap_or_default();
        for client in clients {
            if let Err(e) = client.close().await {
                tracing::debug!(error = %e, "Error while closing SQL Server connection");
            }
        }
        tracing::info!(server = %self.shared.target, "Closed SQL Server pool");
    }
}

/// Transaction pinned to one pooled connection
struct TdsTransaction {
    conn: PooledClient,
    finished: bool,
}

#[async_trait]
impl Transaction for TdsTransaction {
    async fn query(
        &mut self,
        text: &str,
        params: &type_mapping::Params,
    ) -> Result<RowSet, DriverError> {
        let statement = build_query(text, params)?;
        self.conn.run(&statement).await
    }

    async fn commit(mut self: Box<Self>) -> Result<(), DriverError> {
        self.conn.simple("COMMIT TRANSACTION").await?;
        self.finished = true;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), DriverError> {
        self.conn
            .simple("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION")
            .await?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for TdsTransaction {
    fn drop(&mut self) {
        // Never hand a connection with an open transaction back to the pool
        if !self.finished {
            self.conn.healthy = false;
        }
    }
}

async fn with_timeout<T, F>(operation: &'static str, timeout: Duration, fut: F) -> Result<T, DriverError>
where
    F: Future<Output = Result<T, DriverError>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| DriverError::Timeout { operation, timeout })?
}

fn bind_value<'a>(query: &mut Query<'a>, value: &'a SqlValue) {
    match value {
        SqlValue::Text(s) => query.bind(s.as_str()),
        SqlValue::Integer(i) => match i32::try_from(*i) {
            Ok(small) => query.bind(small),
            Err(_) => query.bind(*i),
        },
        SqlValue::Decimal(f) => query.bind(*f),
        SqlValue::Bool(b) => query.bind(*b),
        SqlValue::Null => query.bind(Option::<&str>::None),
    }
}

fn row_to_json(row: tiberius::Row) -> Row {
    let names: Vec<String> = row
        .columns()
        .iter()
        .map(|column| column.name().to_string())
        .collect();

    names
        .into_iter()
        .zip(row)
        .map(|(name, data)| (name, column_to_json(data)))
        .collect()
}

fn column_to_json(data: ColumnData<'static>) -> Value {
    let value = match data {
        ColumnData::U8(v) => v.map(Value::from),
        ColumnData::I16(v) => v.map(Value::from),
        ColumnData::I32(v) => v.map(Value::from),
        ColumnData::I64(v) => v.map(Value::from),
        ColumnData::F32(v) => v.map(|f| Value::from(f64::from(f))),
        ColumnData::F64(v) => v.map(Value::from),
        ColumnData::Bit(v) => v.map(Value::Bool),
        ColumnData::String(v) => v.map(|s| Value::String(s.into_owned())),
        ColumnData::Guid(v) => v.map(|g| Value::String(g.to_string())),
        ColumnData::Binary(v) => v.map(|b| Value::String(hex::encode(&*b))),
        ColumnData::Numeric(v) => v.map(|n| Value::from(f64::from(n))),
        ColumnData::Xml(v) => v.map(|x| Value::String(x.into_owned().into_string())),
        other => temporal_to_json(&other),
    };
    value.unwrap_or(Value::Null)
}

/// Date and time columns as ISO-8601 strings
fn temporal_to_json(data: &ColumnData<'static>) -> Option<Value> {
    if let Ok(Some(dt)) = chrono::DateTime::<chrono::FixedOffset>::from_sql(data) {
        return Some(Value::String(dt.to_rfc3339()));
    }
    if let Ok(Some(dt)) = chrono::NaiveDateTime::from_sql(data) {
        return Some(Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()));
    }
    if let Ok(Some(date)) = chrono::NaiveDate::from_sql(data) {
        return Some(Value::String(date.format("%Y-%m-%d").to_string()));
    }
    if let Ok(Some(time)) = chrono::NaiveTime::from_sql(data) {
        return Some(Value::String(time.format("%H:%M:%S%.3f").to_string()));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    #[test]
    fn test_scalar_columns_to_json() {
        assert_eq!(column_to_json(ColumnData::I32(Some(7))), Value::from(7));
        assert_eq!(column_to_json(ColumnData::I32(None)), Value::Null);
        assert_eq!(column_to_json(ColumnData::Bit(Some(true))), Value::Bool(true));
        assert_eq!(
            column_to_json(ColumnData::String(Some(Cow::Borrowed("Ana")))),
            Value::String("Ana".to_string())
        );
        assert_eq!(
            column_to_json(ColumnData::Binary(Some(Cow::Owned(vec![0xde, 0xad])))),
            Value::String("dead".to_string())
        );
        assert_eq!(column_to_json(ColumnData::F64(Some(2.5))), Value::from(2.5));
    }

    #[test]
    fn test_connection_error_classification() {
        let io = DriverError::Io(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"));
        assert!(io.is_connection_error());
        assert!(DriverError::PoolClosed.is_connection_error());
        assert!(!DriverError::Other("constraint violation".into()).is_connection_error());
        assert!(
            !DriverError::Timeout {
                operation: "query",
                timeout: Duration::from_secs(30)
            }
            .is_connection_error()
        );
    }
}
