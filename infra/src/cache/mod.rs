//! Cache module for Redis-based token storage
//!
//! This module provides the Redis client with retry logic and the token store
//! built on it, plus a factory selecting the backend from configuration.

pub mod redis_client;
pub mod token_storage;


use std::sync::Arc;
use tracing::info;

use tc_core::repositories::access_token::{InMemoryTokenStorage, TokenStorage};
use tc_shared::config::{CacheConfig, CacheType};

use crate::InfrastructureError;

pub use redis_client::{KeyExpiry, RedisClient};
pub use token_storage::RedisTokenStorage;

/// Create the token store selected by `config.cache_type`
///
/// # Returns
/// * `Result<Arc<dyn TokenStorage>, InfrastructureError>` - Connected store or error
pub async fn create_token_storage(
    config: &CacheConfig,
) -> Result<Arc<dyn TokenStorage>, InfrastructureError> {
    match config.cache_type {
        CacheType::Redis => {
            let storage = RedisTokenStorage::connect(config.clone()).await?;
            if !storage.client().health_check().await? {
                return Err(InfrastructureError::General(
                    "Redis health check returned an unexpected reply".to_string(),
                ));
            }
            info!(prefix = %config.key_prefix, "Using Redis token store");
            Ok(Arc::new(storage))
        }
        CacheType::Memory => {
            info!("Using in-memory token store");
            Ok(Arc::new(InMemoryTokenStorage::new()))
        }
    }
}
