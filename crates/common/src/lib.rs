//! Genesis Common Library
//!
//! Shared code for the Genesis knowledge core including:
//! - Error types and handling
//! - Configuration management
//! - Provider identifiers
//! - Credential secrets
//! - Metrics and tracing setup

pub mod auth;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod provider;
pub mod telemetry;

// Re-export commonly used types
pub use auth::Secret;
pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use provider::Provider;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
