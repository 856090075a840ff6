use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::{ErrorResponse, ValidationErrorResponse};

pub type AppResult<T> = Result<T, AppError>;

/// Message returned to clients for every server-side failure.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed: {}", violations.join("; "))]
    Validation { violations: Vec<String> },

    #[error("Field 'document' is required")]
    MissingDocument,

    #[error("Invalid multipart body: {message}")]
    InvalidMultipart { message: String },

    #[error("Virus detected: {signature}")]
    MalwareDetected { signature: String },

    #[error("ClamAV scan failed: {message}")]
    ScanFailed { message: String },

    #[error("Unable to connect to ClamAV on {host}:{port}: {reason}")]
    ScanConnection { host: String, port: u16, reason: String },

    #[error("Connection to ClamAV is not alive on {host}:{port}: {reason}")]
    ScanConnectionNotAlive { host: String, port: u16, reason: String },

    #[error("Unable to connect to Valkey database on {host}:{port}: {reason}")]
    CacheConnection { host: String, port: u16, reason: String },

    #[error("Connection to Valkey is not alive on {host}:{port}: {reason}")]
    CacheConnectionNotAlive { host: String, port: u16, reason: String },

    #[error("Cached value for key {key} could not be (de)serialized: {message}")]
    CacheSerialization { key: String, message: String },

    #[error("Document conversion failed: {message}")]
    Conversion { message: String },

    #[error("Inference failed: {message}")]
    Inference { message: String },

    #[error("Unable to find document classifier model in {path}")]
    ModelNotFound { path: String },

    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl AppError {
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::MissingDocument => "MISSING_DOCUMENT",
            AppError::InvalidMultipart { .. } => "INVALID_MULTIPART",
            AppError::MalwareDetected { .. } => "MALWARE_DETECTED",
            AppError::ScanFailed { .. } => "SCAN_FAILED",
            AppError::ScanConnection { .. } => "SCAN_CONNECTION_ERROR",
            AppError::ScanConnectionNotAlive { .. } => "SCAN_CONNECTION_NOT_ALIVE",
            AppError::CacheConnection { .. } => "CACHE_CONNECTION_ERROR",
            AppError::CacheConnectionNotAlive { .. } => "CACHE_CONNECTION_NOT_ALIVE",
            AppError::CacheSerialization { .. } => "CACHE_SERIALIZATION_ERROR",
            AppError::Conversion { .. } => "CONVERSION_ERROR",
            AppError::Inference { .. } => "INFERENCE_ERROR",
            AppError::ModelNotFound { .. } => "MODEL_NOT_FOUND",
            AppError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation { .. }
            | AppError::MissingDocument
            | AppError::InvalidMultipart { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Messages exposed to the client for 422 responses.
    pub fn client_details(&self) -> Vec<String> {
        match self {
            AppError::Validation { violations } => violations.clone(),
            AppError::MissingDocument | AppError::InvalidMultipart { .. } => vec![self.to_string()],
            _ => Vec::new(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.to_string();

        if status == StatusCode::UNPROCESSABLE_ENTITY {
            tracing::warn!(
                error_code = error_code,
                status_code = %status,
                error_message = %message,
                "Validation didn't pass"
            );
            let body = Json(ValidationErrorResponse {
                detail: self.client_details(),
            });
            return (status, body).into_response();
        }

        tracing::error!(
            error_code = error_code,
            status_code = %status,
            error_message = %message,
            "Unhandled error occurred in the API"
        );

        let body = Json(ErrorResponse {
            message: INTERNAL_ERROR_MESSAGE.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal {
            message: format!("Worker task failed: {}", err),
        }
    }
}

impl From<candle_core::Error> for AppError {
    fn from(err: candle_core::Error) -> Self {
        AppError::Inference {
            message: format!("Candle error: {}", err),
        }
    }
}

// Helper methods for creating specific errors
impl AppError {
    pub fn validation(violations: Vec<String>) -> Self {
        AppError::Validation { violations }
    }

    pub fn conversion(message: impl Into<String>) -> Self {
        AppError::Conversion {
            message: message.into(),
        }
    }

    pub fn inference(message: impl Into<String>) -> Self {
        AppError::Inference {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        AppError::Internal {
            message: message.into(),
        }
    }
}
