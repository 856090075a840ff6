use std::env;
use std::time::Duration;
use anyhow::{Result, Context};
use tracing::{info, warn};

/// Largest accepted page edge in pixels.
pub const MAX_IMAGE_SIZE: u32 = 4096;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub max_file_size_bytes: usize,
    pub max_body_size_mb: usize,
    pub clamav_host: String,
    pub clamav_port: u16,
    pub scan_timeout_seconds: u64,
    pub valkey_host: String,
    pub valkey_port: u16,
    pub model_path: String,
    pub num_classes: usize,
    pub image_size: u32,
    pub inference_workers: usize,
    pub pdfium_library_path: Option<String>,
    pub app_host: String,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        info!("Loading configuration from environment variables");

        let config = Config {
            server_host: Self::string_env_var("SERVER_HOST", "0.0.0.0"),
            server_port: Self::parse_env_var("SERVER_PORT", 8080)
                .context("Failed to parse SERVER_PORT")?,
            max_file_size_bytes: Self::parse_env_var("MAX_FILE_SIZE_BYTES", 2 * 1024 * 1024)
                .context("Failed to parse MAX_FILE_SIZE_BYTES")?,
            max_body_size_mb: Self::parse_env_var("MAX_BODY_SIZE_MB", 16)
                .context("Failed to parse MAX_BODY_SIZE_MB")?,
            clamav_host: Self::string_env_var("CLAMAV_HOST", "127.0.0.1"),
            clamav_port: Self::parse_env_var("CLAMAV_PORT", 3310)
                .context("Failed to parse CLAMAV_PORT")?,
            scan_timeout_seconds: Self::parse_env_var("SCAN_TIMEOUT_SECONDS", 30)
                .context("Failed to parse SCAN_TIMEOUT_SECONDS")?,
            valkey_host: Self::string_env_var("VALKEY_HOST", "127.0.0.1"),
            valkey_port: Self::parse_env_var("VALKEY_PORT", 6379)
                .context("Failed to parse VALKEY_PORT")?,
            model_path: Self::string_env_var("MODEL_PATH", "model/document_classifier.safetensors"),
            num_classes: Self::parse_env_var("NUM_CLASSES", 4)
                .context("Failed to parse NUM_CLASSES")?,
            image_size: Self::parse_env_var("IMAGE_SIZE", 224)
                .context("Failed to parse IMAGE_SIZE")?,
            inference_workers: Self::parse_env_var("INFERENCE_WORKERS", 4)
                .context("Failed to parse INFERENCE_WORKERS")?,
            pdfium_library_path: env::var("PDFIUM_LIBRARY_PATH").ok().filter(|p| !p.is_empty()),
            app_host: Self::string_env_var("APP_HOST", "http://localhost:8080"),
            log_format: LogFormat::from_env(),
        };

        config.validate()?;

        info!("Configuration loaded successfully: {:?}", config);
        Ok(config)
    }

    /// Port to bind, honouring a platform-provided `PORT` over `SERVER_PORT`.
    pub fn listen_port(&self) -> u16 {
        env::var("PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(self.server_port)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_seconds)
    }

    pub fn max_body_size_bytes(&self) -> usize {
        self.max_body_size_mb * 1024 * 1024
    }

    fn string_env_var(var_name: &str, default: &str) -> String {
        env::var(var_name).unwrap_or_else(|_| {
            info!("{} not set, using default: {}", var_name, default);
            default.to_string()
        })
    }

    fn parse_env_var<T>(var_name: &str, default: T) -> Result<T>
    where
        T: std::str::FromStr + Copy + std::fmt::Debug,
        T::Err: std::fmt::Display,
    {
        match env::var(var_name) {
            Ok(val) => match val.parse() {
                Ok(parsed) => Ok(parsed),
                Err(e) => {
                    warn!("Failed to parse {}: {} (using default: {:?})", var_name, e, default);
                    Ok(default)
                }
            },
            Err(_) => {
                info!("{} not set, using default: {:?}", var_name, default);
                Ok(default)
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.server_port == 0 {
            return Err(anyhow::anyhow!("SERVER_PORT must be greater than 0"));
        }
        if self.max_file_size_bytes == 0 {
            return Err(anyhow::anyhow!("MAX_FILE_SIZE_BYTES must be greater than 0"));
        }
        if self.max_body_size_bytes() < self.max_file_size_bytes {
            return Err(anyhow::anyhow!(
                "MAX_BODY_SIZE_MB must leave room for MAX_FILE_SIZE_BYTES"
            ));
        }
        if self.scan_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("SCAN_TIMEOUT_SECONDS must be greater than 0"));
        }
        if self.num_classes < 2 {
            return Err(anyhow::anyhow!("NUM_CLASSES must be at least 2"));
        }
        if self.image_size == 0 || self.image_size > MAX_IMAGE_SIZE {
            return Err(anyhow::anyhow!(
                "IMAGE_SIZE must be between 1 and {}",
                MAX_IMAGE_SIZE
            ));
        }
        if self.inference_workers == 0 {
            return Err(anyhow::anyhow!("INFERENCE_WORKERS must be greater than 0"));
        }
        Ok(())
    }
}

impl LogFormat {
    pub fn from_env() -> Self {
        match env::var("LOG_FORMAT").map(|v| v.to_ascii_lowercase()) {
            Ok(v) if v == "json" => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}
