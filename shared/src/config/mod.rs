//! Configuration module with business-specific sub-modules
//!
//! This module organizes configuration into logical areas:
//! - `cache` - Token store (Redis or in-memory) configuration
//! - `environment` - Environment detection and logging configuration
//! - `token` - Token issuing policy: client ids, TTLs, token length

pub mod cache;
pub mod environment;
pub mod token;

use serde::{Deserialize, Serialize};

// Re-export commonly used types
pub use cache::{CacheConfig, CacheType};
pub use environment::{Environment, LogFormat, LoggingConfig};
pub use token::TokenAuthConfig;

/// Complete application configuration combining all sub-configurations
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Environment configuration
    #[serde(default)]
    pub environment: Environment,

    /// Token store configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Token issuing configuration
    #[serde(default)]
    pub token: TokenAuthConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment
    ///
    /// The log level honours `RUST_LOG` when set, otherwise it follows the
    /// environment's defaults.
    pub fn from_env() -> Self {
        let environment = Environment::from_env();
        let mut logging = LoggingConfig::for_environment(environment);
        if let Ok(level) = std::env::var("RUST_LOG") {
            if !level.is_empty() {
                logging.level = level;
            }
        }

        Self {
            environment,
            cache: CacheConfig::from_env(),
            token: TokenAuthConfig::from_env(),
            logging,
        }
    }
}
