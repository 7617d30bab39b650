//! Redis cache client implementation
//!
//! This module provides a Redis client with a shared multiplexed connection,
//! retry logic, and the key, set and pipeline operations the token store is
//! built from.

use redis::{
    aio::MultiplexedConnection, AsyncCommands, Client, FromRedisValue, Pipeline, RedisError,
    RedisResult, Script,
};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use tc_shared::config::CacheConfig;

use crate::InfrastructureError;

/// Upper bound for the backoff delay between retries
const MAX_RETRY_DELAY_MS: u64 = 5000;

type RedisFuture<T> = Pin<Box<dyn Future<Output = RedisResult<T>> + Send>>;

/// Expiration state of a key as reported by `TTL`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyExpiry {
    /// The key does not exist
    Missing,
    /// The key exists without expiration
    Persistent,
    /// The key expires in the given number of seconds
    ExpiresIn(i64),
}

impl KeyExpiry {
    pub(crate) fn from_ttl_reply(ttl: i64) -> Self {
        match ttl {
            -2 => KeyExpiry::Missing,
            -1 => KeyExpiry::Persistent,
            seconds => KeyExpiry::ExpiresIn(seconds.max(0)),
        }
    }
}

/// Redis cache client with a multiplexed connection and retry logic
///
/// Cloning is cheap; clones share the underlying connection.
#[derive(Clone)]
pub struct RedisClient {
    /// Redis multiplexed connection for async operations
    connection: MultiplexedConnection,
    /// Configuration used to create this client
    config: CacheConfig,
    /// Maximum number of attempts for operations
    max_retries: u32,
    /// Base delay between retries (exponential backoff)
    retry_delay_ms: u64,
}

impl RedisClient {
    /// Create a new Redis client using the retry settings of `config`
    ///
    /// # Arguments
    /// * `config` - Cache configuration settings
    ///
    /// # Returns
    /// * `Result<Self, InfrastructureError>` - Redis client or error
    pub async fn new(config: CacheConfig) -> Result<Self, InfrastructureError> {
        let max_retries = config.max_retries;
        let retry_delay_ms = config.retry_delay_ms;
        Self::new_with_retry_config(config, max_retries, retry_delay_ms).await
    }

    /// Create a new Redis client with custom retry configuration
    ///
    /// # Arguments
    /// * `config` - Cache configuration settings
    /// * `max_retries` - Maximum number of attempts
    /// * `retry_delay_ms` - Base delay between retries in milliseconds
    pub async fn new_with_retry_config(
        config: CacheConfig,
        max_retries: u32,
        retry_delay_ms: u64,
    ) -> Result<Self, InfrastructureError> {
        info!(url = %mask_url(&config.url), "Creating Redis client");

        let client = Client::open(config.url.as_str()).map_err(|e| {
            error!("Failed to parse Redis URL: {}", e);
            InfrastructureError::Config(format!("Invalid Redis URL: {}", e))
        })?;

        let connection =
            Self::create_connection_with_retry(client, max_retries, retry_delay_ms).await?;

        info!("Redis client created successfully");

        Ok(Self {
            connection,
            config,
            max_retries: max_retries.max(1),
            retry_delay_ms,
        })
    }

    /// Configuration this client was created with
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Create multiplexed connection with retry logic
    async fn create_connection_with_retry(
        client: Client,
        max_retries: u32,
        retry_delay_ms: u64,
    ) -> Result<MultiplexedConnection, InfrastructureError> {
        let mut attempts = 0;
        let mut delay = retry_delay_ms;

        loop {
            attempts += 1;
            debug!("Attempting to connect to Redis (attempt {})", attempts);

            match client.get_multiplexed_async_connection().await {
                Ok(connection) => {
                    info!("Successfully connected to Redis");
                    return Ok(connection);
                }
                Err(e) if attempts < max_retries => {
                    warn!(
                        "Failed to connect to Redis (attempt {}/{}): {}. Retrying in {}ms...",
                        attempts, max_retries, e, delay
                    );
                    sleep(Duration::from_millis(delay)).await;
                    delay = next_delay(delay);
                }
                Err(e) => {
                    error!(
                        "Failed to connect to Redis after {} attempts: {}",
                        attempts, e
                    );
                    return Err(InfrastructureError::Cache(e));
                }
            }
        }
    }

    /// Set a value without expiration
    pub async fn set(&self, key: &str, value: &str) -> Result<(), InfrastructureError> {
        debug!("Setting key '{}'", log_key(key));

        self.execute_with_retry(|mut conn| {
            let key = key.to_string();
            let value = value.to_string();

            Box::pin(async move { conn.set::<_, _, ()>(key, value).await })
        })
        .await
        .map_err(|e| {
            error!("Failed to set key '{}': {}", log_key(key), e);
            InfrastructureError::Cache(e)
        })
    }

    /// Set a value with expiration time
    ///
    /// # Arguments
    /// * `key` - Cache key
    /// * `value` - Value to cache
    /// * `expiry_seconds` - Time to live in seconds
    pub async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        expiry_seconds: u64,
    ) -> Result<(), InfrastructureError> {
        debug!("Setting key '{}' with expiry {}s", log_key(key), expiry_seconds);

        self.execute_with_retry(|mut conn| {
            let key = key.to_string();
            let value = value.to_string();

            Box::pin(async move { conn.set_ex::<_, _, ()>(key, value, expiry_seconds).await })
        })
        .await
        .map_err(|e| {
            error!("Failed to set key '{}': {}", log_key(key), e);
            InfrastructureError::Cache(e)
        })
    }

    /// Get a value from cache
    ///
    /// # Returns
    /// * `Result<Option<String>, InfrastructureError>` - Cached value or None if not found
    pub async fn get(&self, key: &str) -> Result<Option<String>, InfrastructureError> {
        debug!("Getting key '{}'", log_key(key));

        let result = self
            .execute_with_retry(|mut conn| {
                let key = key.to_string();

                Box::pin(async move { conn.get::<_, Option<String>>(key).await })
            })
            .await;

        match result {
            Ok(value) => {
                if value.is_none() {
                    debug!("Key '{}' not found", log_key(key));
                }
                Ok(value)
            }
            Err(e) => {
                error!("Failed to get key '{}': {}", log_key(key), e);
                Err(InfrastructureError::Cache(e))
            }
        }
    }

    /// Get several values in one round trip
    ///
    /// # Returns
    /// One entry per key, in input order, `None` for missing keys
    pub async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, InfrastructureError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        debug!("Getting {} keys", keys.len());

        self.execute_with_retry(|mut conn| {
            let keys = keys.to_vec();

            Box::pin(async move {
                redis::cmd("MGET")
                    .arg(keys)
                    .query_async::<_, Vec<Option<String>>>(&mut conn)
                    .await
            })
        })
        .await
        .map_err(|e| {
            error!("Failed to get {} keys: {}", keys.len(), e);
            InfrastructureError::Cache(e)
        })
    }

    /// Check if a key exists in cache
    pub async fn exists(&self, key: &str) -> Result<bool, InfrastructureError> {
        debug!("Checking if key '{}' exists", log_key(key));

        self.execute_with_retry(|mut conn| {
            let key = key.to_string();

            Box::pin(async move { conn.exists::<_, bool>(key).await })
        })
        .await
        .map_err(|e| {
            error!("Failed to check key '{}' existence: {}", log_key(key), e);
            InfrastructureError::Cache(e)
        })
    }

    /// Get the expiration state of a key
    pub async fn expiry(&self, key: &str) -> Result<KeyExpiry, InfrastructureError> {
        debug!("Getting TTL for key '{}'", log_key(key));

        self.execute_with_retry(|mut conn| {
            let key = key.to_string();

            Box::pin(async move { conn.ttl::<_, i64>(key).await })
        })
        .await
        .map(KeyExpiry::from_ttl_reply)
        .map_err(|e| {
            error!("Failed to get TTL for key '{}': {}", log_key(key), e);
            InfrastructureError::Cache(e)
        })
    }

    /// Get every member of a set
    pub async fn set_members(&self, key: &str) -> Result<Vec<String>, InfrastructureError> {
        debug!("Reading members of set '{}'", log_key(key));

        self.execute_with_retry(|mut conn| {
            let key = key.to_string();

            Box::pin(async move { conn.smembers::<_, Vec<String>>(key).await })
        })
        .await
        .map_err(|e| {
            error!("Failed to read set '{}': {}", log_key(key), e);
            InfrastructureError::Cache(e)
        })
    }

    /// Remove members from a set
    ///
    /// # Returns
    /// Number of members actually removed
    pub async fn remove_members(
        &self,
        key: &str,
        members: &[String],
    ) -> Result<u64, InfrastructureError> {
        if members.is_empty() {
            return Ok(0);
        }
        debug!("Removing {} members from set '{}'", members.len(), log_key(key));

        self.execute_with_retry(|mut conn| {
            let key = key.to_string();
            let members = members.to_vec();

            Box::pin(async move { conn.srem::<_, _, u64>(key, members).await })
        })
        .await
        .map_err(|e| {
            error!("Failed to remove members from set '{}': {}", log_key(key), e);
            InfrastructureError::Cache(e)
        })
    }

    /// Run a pipeline, discarding its replies
    ///
    /// Build the pipeline with `redis::pipe()`; call `.atomic()` on it to run
    /// the commands inside `MULTI`/`EXEC`.
    pub async fn run_pipeline(&self, pipeline: &Pipeline) -> Result<(), InfrastructureError> {
        self.execute_with_retry(|mut conn| {
            let pipeline = pipeline.clone();

            Box::pin(async move { pipeline.query_async::<_, ()>(&mut conn).await })
        })
        .await
        .map_err(|e| {
            error!("Redis pipeline failed: {}", e);
            InfrastructureError::Cache(e)
        })
    }

    /// Run a Lua script atomically
    ///
    /// The script is sent by hash and loaded on the first `NOSCRIPT` reply.
    ///
    /// # Arguments
    /// * `script` - Script to run
    /// * `keys` - Values for `KEYS`
    /// * `args` - Values for `ARGV`
    pub async fn run_script<T>(
        &self,
        script: &Script,
        keys: &[String],
        args: &[String],
    ) -> Result<T, InfrastructureError>
    where
        T: FromRedisValue + Send + 'static,
    {
        self.execute_with_retry(|mut conn| {
            let script = script.clone();
            let keys = keys.to_vec();
            let args = args.to_vec();

            Box::pin(async move {
                let mut invocation = script.prepare_invoke();
                for key in &keys {
                    invocation.key(key);
                }
                for arg in &args {
                    invocation.arg(arg);
                }
                invocation.invoke_async::<_, T>(&mut conn).await
            })
        })
        .await
        .map_err(|e| {
            error!("Redis script failed: {}", e);
            InfrastructureError::Cache(e)
        })
    }

    /// Check if the Redis connection is healthy
    ///
    /// Performs a PING command to verify connectivity.
    pub async fn health_check(&self) -> Result<bool, InfrastructureError> {
        debug!("Performing Redis health check");

        let result = self
            .execute_with_retry(|mut conn| {
                Box::pin(async move { redis::cmd("PING").query_async::<_, String>(&mut conn).await })
            })
            .await;

        match result {
            Ok(response) if response == "PONG" => Ok(true),
            Ok(response) => {
                warn!("Redis health check returned unexpected response: {}", response);
                Ok(false)
            }
            Err(e) => {
                error!("Redis health check failed: {}", e);
                Err(InfrastructureError::Cache(e))
            }
        }
    }

    /// Execute a Redis operation with automatic retry logic
    ///
    /// Retriable errors are retried with exponential backoff; any other error
    /// is returned immediately.
    async fn execute_with_retry<F, T>(&self, operation: F) -> RedisResult<T>
    where
        F: Fn(MultiplexedConnection) -> RedisFuture<T>,
    {
        let mut attempts = 0;
        let mut delay = self.retry_delay_ms;

        loop {
            attempts += 1;
            let conn = self.connection.clone();

            match operation(conn).await {
                Ok(result) => return Ok(result),
                Err(e) if attempts < self.max_retries && is_retriable_error(&e) => {
                    warn!(
                        "Redis operation failed (attempt {}/{}): {}. Retrying in {}ms...",
                        attempts, self.max_retries, e, delay
                    );
                    sleep(Duration::from_millis(delay)).await;
                    delay = next_delay(delay);
                }
                Err(e) => {
                    error!("Redis operation failed after {} attempts: {}", attempts, e);
                    return Err(e);
                }
            }
        }
    }
}

/// Exponential backoff step, capped
pub(crate) fn next_delay(delay: u64) -> u64 {
    delay.saturating_mul(2).min(MAX_RETRY_DELAY_MS)
}

/// Check if a Redis error is transient and the operation should be retried
pub(crate) fn is_retriable_error(error: &RedisError) -> bool {
    matches!(
        error.kind(),
        redis::ErrorKind::IoError
            | redis::ErrorKind::ClientError
            | redis::ErrorKind::BusyLoadingError
            | redis::ErrorKind::TryAgain
    )
}

/// Mask the token part of a key for logging
///
/// The last `:`-separated segment is shortened when it is long enough to be a
/// credential.
pub(crate) fn log_key(key: &str) -> String {
    match key.rsplit_once(':') {
        Some((head, tail)) if tail.len() > 12 => {
            format!("{}:{}***", head, tail.get(..6).unwrap_or_default())
        }
        None if key.len() > 12 => format!("{}***", key.get(..6).unwrap_or_default()),
        _ => key.to_string(),
    }
}

/// Mask credentials in a Redis URL for logging
pub(crate) fn mask_url(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(proto_end) = url.find("://") {
            let proto = &url[..proto_end + 3];
            let host_part = &url[at_pos..];
            return format!("{}****{}", proto, host_part);
        }
    }
    url.to_string()
}
