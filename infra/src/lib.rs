//! # Infrastructure Layer
//!
//! This crate implements the infrastructure layer for cached token
//! authentication. It provides the concrete token store and the process
//! bootstrap around it.
//!
//! ## Architecture
//!
//! The infrastructure layer contains:
//! - **Cache**: Redis client with retry logic and the Redis token store
//! - **Telemetry**: `tracing` subscriber installation
//! - **Configuration**: `.env` aware loading of the shared configuration

use tc_core::errors::DomainError;
use tc_shared::{AppConfig, Environment};

/// Cache module - Redis client and token storage
pub mod cache;

/// Telemetry module - tracing subscriber setup
pub mod telemetry;

pub use cache::{create_token_storage, RedisClient, RedisTokenStorage};
pub use telemetry::init_tracing;

/// Load application configuration from the environment
///
/// The environment-specific file (e.g. `.env.production`) and then `.env` are
/// loaded when present. Variables already set take precedence, so the
/// process environment wins over both files.
pub fn load_config() -> AppConfig {
    let environment = Environment::from_env();
    for file in [environment.env_file(), ".env"] {
        if let Ok(path) = dotenvy::from_filename(file) {
            tracing::debug!(path = %path.display(), "Loaded environment file");
        }
    }
    AppConfig::from_env()
}

/// Infrastructure-specific error types
#[derive(Debug, thiserror::Error)]
pub enum InfrastructureError {
    /// Redis cache error
    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Record encoding error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// General infrastructure error
    #[error("Infrastructure error: {0}")]
    General(String),
}

impl From<InfrastructureError> for DomainError {
    fn from(error: InfrastructureError) -> Self {
        match error {
            InfrastructureError::Serialization(e) => DomainError::Serialization {
                message: e.to_string(),
            },
            other => DomainError::storage(other),
        }
    }
}
