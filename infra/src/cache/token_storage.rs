//! Redis-backed token storage
//!
//! Key layout (every key carries the configured prefix):
//! - `{prefix}:token:{token}` - JSON encoded token record, with the native
//!   expiration set to the token's remaining lifetime
//! - `{prefix}:user:{user_id}` - set of token strings issued to that user
//!
//! The user index expires together with its longest-lived member and is
//! persistent while it holds a token without TTL. Adding a member and
//! stretching the index expiration run as one Lua script. Guest tokens are
//! never indexed.
//!
//! Records that no longer decode are reported as missing, so the lazy prune
//! drops them from the index.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use redis::Script;
use tracing::{debug, info, warn};

use tc_core::domain::entities::access_token::{mask_token, AccessToken, TokenRecord};
use tc_core::domain::entities::user::UserId;
use tc_core::errors::{DomainError, TokenError};
use tc_core::repositories::access_token::TokenStorage;
use tc_shared::config::CacheConfig;

use super::redis_client::{KeyExpiry, RedisClient};

/// Adds `ARGV[1]` to the set at `KEYS[1]` and stretches the set's expiration
/// to `ARGV[2]` seconds; an empty `ARGV[2]` makes the set persistent. Replies
/// with the resulting `TTL`.
const INDEX_TOKEN_SCRIPT: &str = r#"
local current = redis.call('TTL', KEYS[1])
redis.call('SADD', KEYS[1], ARGV[1])
if ARGV[2] == '' then
  if current ~= -1 then
    redis.call('PERSIST', KEYS[1])
  end
  return -1
end
if current == -1 then
  return -1
end
local ttl = tonumber(ARGV[2])
if current == -2 or current < ttl then
  redis.call('EXPIRE', KEYS[1], ttl)
  return ttl
end
return current
"#;
use crate::InfrastructureError;

/// Token store on top of [`RedisClient`]
#[derive(Clone)]
pub struct RedisTokenStorage {
    client: RedisClient,
    index_script: Script,
}

impl RedisTokenStorage {
    /// Create a store over an existing client
    pub fn new(client: RedisClient) -> Self {
        Self {
            client,
            index_script: Script::new(INDEX_TOKEN_SCRIPT),
        }
    }

    /// Connect to Redis and create a store
    pub async fn connect(config: CacheConfig) -> Result<Self, InfrastructureError> {
        let client = RedisClient::new(config).await?;
        Ok(Self::new(client))
    }

    pub fn client(&self) -> &RedisClient {
        &self.client
    }

    /// Key of a token record
    pub fn token_key(&self, token: &str) -> String {
        self.client.config().make_key(&format!("token:{}", token))
    }

    /// Key of a user's index, `None` for guests
    pub fn user_key(&self, user_id: &UserId) -> Option<String> {
        user_id
            .as_identifier()
            .map(|id| self.client.config().make_key(&format!("user:{}", id)))
    }

    fn encode(token: &AccessToken) -> Result<String, InfrastructureError> {
        Ok(serde_json::to_string(token.record())?)
    }

    /// Add a token to a user's index and stretch the index expiration to cover it
    async fn index_token(
        &self,
        index_key: &str,
        token: &str,
        record_ttl: Option<i64>,
    ) -> Result<KeyExpiry, InfrastructureError> {
        let keys = [index_key.to_string()];
        let args = [
            token.to_string(),
            record_ttl.map(|ttl| ttl.to_string()).unwrap_or_default(),
        ];

        let reply: i64 = self
            .client
            .run_script(&self.index_script, &keys, &args)
            .await?;
        Ok(KeyExpiry::from_ttl_reply(reply))
    }
}

fn decode(token: &str, payload: &str) -> Result<AccessToken, DomainError> {
    let record: TokenRecord = serde_json::from_str(payload)?;

    if record.token != token {
        return Err(TokenError::InvalidRecord {
            reason: format!("record stored under {} names another token", mask_token(token)),
        }
        .into());
    }
    Ok(AccessToken::from_record(record))
}

/// Decode a stored payload, treating an unreadable record as missing
pub(crate) fn decode_record(token: &str, payload: &str) -> Option<AccessToken> {
    match decode(token, payload) {
        Ok(token) => Some(token),
        Err(e) => {
            warn!(token = %mask_token(token), error = %e, "Ignoring unreadable token record");
            None
        }
    }
}

/// Lifetime a user index needs to cover every given token
///
/// `None` when at least one token never expires.
pub(crate) fn index_ttl(tokens: &[AccessToken], now: DateTime<Utc>) -> Option<i64> {
    tokens
        .iter()
        .map(|token| token.remaining_ttl(now))
        .try_fold(0, |longest: i64, remaining| remaining.map(|r| longest.max(r)))
}

#[async_trait]
impl TokenStorage for RedisTokenStorage {
    async fn get_token(&self, token: &str) -> Result<Option<AccessToken>, DomainError> {
        let payload = self.client.get(&self.token_key(token)).await?;

        Ok(payload.and_then(|payload| decode_record(token, &payload)))
    }

    async fn get_tokens(
        &self,
        tokens: &[String],
    ) -> Result<HashMap<String, AccessToken>, DomainError> {
        if tokens.is_empty() {
            return Ok(HashMap::new());
        }

        let keys: Vec<String> = tokens.iter().map(|token| self.token_key(token)).collect();
        let payloads = self.client.mget(&keys).await?;

        let mut found = HashMap::with_capacity(tokens.len());
        for (token, payload) in tokens.iter().zip(payloads) {
            if let Some(found_token) = payload.and_then(|payload| decode_record(token, &payload)) {
                found.insert(token.clone(), found_token);
            }
        }
        Ok(found)
    }

    async fn set_token(&self, token: &AccessToken) -> Result<(), DomainError> {
        let key = self.token_key(token.token());
        let index_key = self.user_key(token.user_id());
        let remaining = token.remaining_ttl(Utc::now());

        if matches!(remaining, Some(seconds) if seconds <= 0) {
            debug!(
                token = %mask_token(token.token()),
                "Token lifetime already spent, removing instead of storing"
            );
            let mut pipe = redis::pipe();
            pipe.del(&key).ignore();
            if let Some(index_key) = &index_key {
                pipe.srem(index_key, token.token()).ignore();
            }
            self.client.run_pipeline(&pipe).await?;
            return Ok(());
        }

        let payload = Self::encode(token)?;
        match remaining {
            Some(seconds) => {
                self.client
                    .set_with_expiry(&key, &payload, seconds.unsigned_abs())
                    .await?
            }
            None => self.client.set(&key, &payload).await?,
        }

        let index_expiry = match index_key {
            Some(index_key) => Some(self.index_token(&index_key, token.token(), remaining).await?),
            None => None,
        };

        debug!(
            token = %mask_token(token.token()),
            user_id = %token.user_id(),
            ttl = ?remaining,
            index_expiry = ?index_expiry,
            "Stored token"
        );
        Ok(())
    }

    async fn token_exists(&self, token: &str) -> Result<bool, DomainError> {
        Ok(self.client.exists(&self.token_key(token)).await?)
    }

    async fn remove_token(&self, token: &AccessToken) -> Result<(), DomainError> {
        let mut pipe = redis::pipe();
        pipe.del(self.token_key(token.token())).ignore();
        if let Some(index_key) = self.user_key(token.user_id()) {
            pipe.srem(index_key, token.token()).ignore();
        }
        self.client.run_pipeline(&pipe).await?;

        info!(
            token = %mask_token(token.token()),
            user_id = %token.user_id(),
            "Removed token"
        );
        Ok(())
    }

    async fn get_user_tokens(&self, user_id: &UserId) -> Result<Vec<String>, DomainError> {
        match self.user_key(user_id) {
            Some(index_key) => Ok(self.client.set_members(&index_key).await?),
            None => Ok(Vec::new()),
        }
    }

    async fn set_user_tokens(
        &self,
        user_id: &UserId,
        tokens: &[AccessToken],
    ) -> Result<(), DomainError> {
        let Some(index_key) = self.user_key(user_id) else {
            return Ok(());
        };

        let mut pipe = redis::pipe();
        pipe.atomic().del(&index_key).ignore();

        if !tokens.is_empty() {
            let members: Vec<&str> = tokens.iter().map(|token| token.token()).collect();
            match index_ttl(tokens, Utc::now()) {
                None => {
                    pipe.sadd(&index_key, members).ignore();
                }
                Some(ttl) if ttl > 0 => {
                    pipe.sadd(&index_key, members).ignore();
                    pipe.expire(&index_key, ttl).ignore();
                }
                // Every member is already past its lifetime
                Some(_) => {}
            }
        }

        self.client.run_pipeline(&pipe).await?;
        debug!(user_id = %user_id, count = tokens.len(), "Replaced user token index");
        Ok(())
    }

    async fn remove_user_tokens(
        &self,
        user_id: &UserId,
        tokens: &[String],
    ) -> Result<(), DomainError> {
        let Some(index_key) = self.user_key(user_id) else {
            return Ok(());
        };
        self.client.remove_members(&index_key, tokens).await?;
        Ok(())
    }
}
