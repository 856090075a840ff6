//! Valkey (Redis protocol) connector and the prediction cache built on it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::models::Prediction;
use crate::services::hashing::CacheKey;

/// Upper bound for the initial connect and ping at startup.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection to a key-value store holding cached predictions as text.
#[async_trait]
pub trait CacheConnector: Send + Sync {
    /// Pings the store, failing with `CacheConnectionNotAlive`.
    async fn is_alive(&self) -> AppResult<()>;

    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    async fn set(&self, key: &str, value: String) -> AppResult<()>;

    async fn close(&self);
}

pub struct ValkeyConnector {
    host: String,
    port: u16,
    connection: ConnectionManager,
    closed: AtomicBool,
}

impl ValkeyConnector {
    /// Opens a managed connection and verifies it with a ping. The first
    /// attempt is not retried, so an unreachable store fails startup within
    /// [`CONNECT_TIMEOUT`].
    pub async fn connect(host: impl Into<String>, port: u16) -> AppResult<Self> {
        let host = host.into();
        info!(host = %host, port = port, "Creating connection to Valkey database");

        let connection_error = |reason: String| AppError::CacheConnection {
            host: host.clone(),
            port,
            reason,
        };

        let client = redis::Client::open(format!("redis://{}:{}/", host, port))
            .map_err(|e| connection_error(e.to_string()))?;
        let manager_config = ConnectionManagerConfig::new()
            .set_number_of_retries(0)
            .set_connection_timeout(CONNECT_TIMEOUT);

        let connection = tokio::time::timeout(CONNECT_TIMEOUT, async {
            let mut connection = ConnectionManager::new_with_config(client, manager_config).await?;
            ping(&mut connection).await?;
            Ok::<_, redis::RedisError>(connection)
        })
        .await
        .map_err(|_| {
            connection_error(format!(
                "no answer within {} seconds",
                CONNECT_TIMEOUT.as_secs()
            ))
        })?
        .map_err(|e| connection_error(e.to_string()))?;

        info!("Successfully created connection to Valkey database");
        Ok(Self {
            host,
            port,
            connection,
            closed: AtomicBool::new(false),
        })
    }

    fn not_alive(&self, reason: impl Into<String>) -> AppError {
        AppError::CacheConnectionNotAlive {
            host: self.host.clone(),
            port: self.port,
            reason: reason.into(),
        }
    }

    fn request_error(&self, err: redis::RedisError) -> AppError {
        if err.is_connection_dropped() || err.is_connection_refusal() || err.is_io_error() {
            self.not_alive(err.to_string())
        } else {
            AppError::internal(format!("Valkey command failed: {}", err))
        }
    }
}

async fn ping(connection: &mut ConnectionManager) -> redis::RedisResult<()> {
    let _: String = redis::cmd("PING").query_async::<String>(connection).await?;
    Ok(())
}

#[async_trait]
impl CacheConnector for ValkeyConnector {
    async fn is_alive(&self) -> AppResult<()> {
        debug!(host = %self.host, port = self.port, "Checking if connection to Valkey database is alive");
        if self.closed.load(Ordering::Acquire) {
            return Err(self.not_alive("connection closed"));
        }

        let mut connection = self.connection.clone();
        ping(&mut connection).await.map_err(|e| {
            warn!(host = %self.host, port = self.port, error = %e, "Connection to Valkey database is not alive");
            self.not_alive(e.to_string())
        })?;
        debug!("Connection to Valkey database is alive");
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut connection = self.connection.clone();
        connection
            .get::<_, Option<String>>(key)
            .await
            .map_err(|e| self.request_error(e))
    }

    async fn set(&self, key: &str, value: String) -> AppResult<()> {
        let mut connection = self.connection.clone();
        connection
            .set::<_, _, ()>(key, value)
            .await
            .map_err(|e| self.request_error(e))
    }

    async fn close(&self) {
        // ConnectionManager drops its socket with the last clone; refuse
        // further use from here on.
        self.closed.store(true, Ordering::Release);
        info!(host = %self.host, port = self.port, "Closed connection to Valkey database");
    }
}

/// Prediction cache keyed by [`CacheKey`], values stored as JSON text.
#[derive(Clone)]
pub struct CacheStore {
    connector: Arc<dyn CacheConnector>,
}

impl CacheStore {
    pub fn new(connector: Arc<dyn CacheConnector>) -> Self {
        Self { connector }
    }

    pub async fn read(&self, key: &CacheKey) -> AppResult<Option<Prediction>> {
        debug!(key = %key, "Getting response from Valkey");
        self.connector.is_alive().await?;

        match self.connector.get(key.as_str()).await? {
            Some(raw) => {
                let value = serde_json::from_str(&raw).map_err(|e| AppError::CacheSerialization {
                    key: key.to_string(),
                    message: e.to_string(),
                })?;
                info!(key = %key, "Returning response from Valkey");
                Ok(Some(value))
            }
            None => {
                info!(key = %key, "Response not available in Valkey");
                Ok(None)
            }
        }
    }

    pub async fn write(&self, key: &CacheKey, value: &Prediction) -> AppResult<()> {
        debug!(key = %key, "Saving data to Valkey");
        self.connector.is_alive().await?;

        let raw = serde_json::to_string(value).map_err(|e| AppError::CacheSerialization {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        self.connector.set(key.as_str(), raw).await?;
        info!(key = %key, "Successfully saved data in Valkey");
        Ok(())
    }
}
