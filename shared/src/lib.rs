//! Shared configuration for the token authentication workspace
//!
//! This crate provides the configuration surface consumed by the core and
//! infrastructure crates:
//! - Token issuing policy (client ids, default TTLs, token length)
//! - Key-value store connection settings
//! - Environment detection and logging settings

pub mod config;

// Re-export commonly used items at crate root
pub use config::{
    AppConfig, CacheConfig, CacheType, Environment, LogFormat, LoggingConfig, TokenAuthConfig,
};
