//! Document Gateway
//!
//! An HTTP gateway that classifies uploaded PDF documents. Every upload is
//! scanned by ClamAV, validated, and looked up in a content-addressed
//! Valkey cache before the page classifier runs.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod state;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use state::AppContext;
