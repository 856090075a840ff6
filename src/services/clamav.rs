//! ClamAV connector and the antivirus gate every upload passes through.

use std::str;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use clamav_client::Tcp;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanVerdict {
    Clean,
    Infected(String),
}

/// Connection to a content-scanning service.
#[async_trait]
pub trait ScanConnector: Send + Sync {
    /// Pings the service, failing with `ScanConnectionNotAlive`.
    async fn is_alive(&self) -> AppResult<()>;

    /// Streams `data` to the service and returns its verdict.
    async fn instream(&self, data: Bytes) -> AppResult<ScanVerdict>;
}

/// `clamd` over TCP. Every command opens its own short-lived connection,
/// so the connector only holds the address.
#[derive(Debug, Clone)]
pub struct ClamavConnector {
    host: String,
    port: u16,
    timeout: Duration,
}

impl ClamavConnector {
    /// Creates the connector and verifies the daemon answers a ping.
    pub async fn connect(host: impl Into<String>, port: u16, timeout: Duration) -> AppResult<Self> {
        let connector = Self {
            host: host.into(),
            port,
            timeout,
        };

        info!(host = %connector.host, port = connector.port, "Creating connection to ClamAV");
        connector
            .ping()
            .await
            .map_err(|reason| AppError::ScanConnection {
                host: connector.host.clone(),
                port: connector.port,
                reason,
            })?;
        info!("Successfully created connection to ClamAV");

        Ok(connector)
    }

    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn ping(&self) -> Result<(), String> {
        let address = self.address();
        let response = self
            .run_blocking(move || {
                clamav_client::ping(Tcp {
                    host_address: address.as_str(),
                })
            })
            .await?;

        if response == clamav_client::PONG {
            Ok(())
        } else {
            Err(format!(
                "unexpected ping response: {}",
                String::from_utf8_lossy(&response).trim_end_matches('\0')
            ))
        }
    }

    /// Runs a synchronous clamd command on the blocking pool, bounded by the
    /// configured timeout.
    async fn run_blocking<F>(&self, command: F) -> Result<Vec<u8>, String>
    where
        F: FnOnce() -> std::io::Result<Vec<u8>> + Send + 'static,
    {
        match tokio::time::timeout(self.timeout, tokio::task::spawn_blocking(command)).await {
            Ok(Ok(Ok(response))) => Ok(response),
            Ok(Ok(Err(e))) => Err(e.to_string()),
            Ok(Err(e)) => Err(format!("clamd task join error: {}", e)),
            Err(_) => Err(format!(
                "clamd did not answer within {} seconds",
                self.timeout.as_secs()
            )),
        }
    }
}

#[async_trait]
impl ScanConnector for ClamavConnector {
    async fn is_alive(&self) -> AppResult<()> {
        debug!(host = %self.host, port = self.port, "Checking if connection to ClamAV is alive");
        self.ping().await.map_err(|reason| {
            warn!(host = %self.host, port = self.port, reason = %reason, "Connection to ClamAV is not alive");
            AppError::ScanConnectionNotAlive {
                host: self.host.clone(),
                port: self.port,
                reason,
            }
        })
    }

    async fn instream(&self, data: Bytes) -> AppResult<ScanVerdict> {
        let address = self.address();
        let response = self
            .run_blocking(move || {
                clamav_client::scan_buffer(
                    &data,
                    Tcp {
                        host_address: address.as_str(),
                    },
                    None,
                )
            })
            .await
            .map_err(|message| AppError::ScanFailed { message })?;

        parse_verdict(&response)
    }
}

/// Interprets a `clamd` INSTREAM reply such as `stream: OK` or
/// `stream: Eicar-Test-Signature FOUND`.
pub fn parse_verdict(response: &[u8]) -> AppResult<ScanVerdict> {
    let is_clean = clamav_client::clean(response).map_err(|e| AppError::ScanFailed {
        message: format!("Failed to parse ClamAV response: {}", e),
    })?;
    if is_clean {
        return Ok(ScanVerdict::Clean);
    }

    let reply = str::from_utf8(response)
        .map_err(|e| AppError::ScanFailed {
            message: format!("Failed to parse ClamAV response: {}", e),
        })?
        .trim_end_matches('\0')
        .trim();
    let body = reply.strip_prefix("stream:").unwrap_or(reply).trim();

    match body.strip_suffix("FOUND") {
        Some(signature) if !signature.trim().is_empty() => {
            Ok(ScanVerdict::Infected(signature.trim().to_string()))
        }
        Some(_) => Ok(ScanVerdict::Infected("unknown".to_string())),
        None => Err(AppError::ScanFailed {
            message: format!("ClamAV returned: {}", body),
        }),
    }
}

/// Gate rejecting any upload the scan service does not report as clean.
#[derive(Clone)]
pub struct AntivirusScanner {
    connector: Arc<dyn ScanConnector>,
}

impl AntivirusScanner {
    pub fn new(connector: Arc<dyn ScanConnector>) -> Self {
        Self { connector }
    }

    pub async fn scan(&self, data: Bytes) -> AppResult<()> {
        let start = Instant::now();
        info!(size = data.len(), "Scanning file with ClamAV");

        self.connector.is_alive().await?;
        match self.connector.instream(data).await? {
            ScanVerdict::Clean => {
                info!(duration_ms = start.elapsed().as_millis() as u64, "File scan completed: clean");
                Ok(())
            }
            ScanVerdict::Infected(signature) => {
                warn!(
                    duration_ms = start.elapsed().as_millis() as u64,
                    virus = %signature,
                    "File scan detected virus"
                );
                Err(AppError::MalwareDetected { signature })
            }
        }
    }
}
