//! Access token entity with change tracking.
//!
//! An [`AccessToken`] wraps the persisted [`TokenRecord`] and remembers which
//! fields were modified since the last persisted state, so storage writes can
//! be skipped when nothing changed.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, warn};

use crate::domain::entities::user::UserId;
use crate::errors::{DomainResult, TokenError};
use crate::repositories::access_token::TokenStorage;
use crate::services::access_token::TokenCodec;

/// Persisted state of one issued token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Opaque token string, primary key of the record
    pub token: String,

    /// Owner of the token
    pub user_id: UserId,

    /// Issuing application or channel
    pub client_id: String,

    /// Lifetime in seconds counted from `updated_at`, `None` never expires
    pub ttl: Option<i64>,

    /// Timestamp when the token was created
    pub created_at: DateTime<Utc>,

    /// Timestamp of the last TTL assignment
    pub updated_at: DateTime<Utc>,
}

/// Fields of a token record tracked for changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TokenField {
    Token,
    UserId,
    ClientId,
    Ttl,
    CreatedAt,
    UpdatedAt,
}

impl TokenField {
    /// Every tracked field, in record order
    pub const ALL: [TokenField; 6] = [
        TokenField::Token,
        TokenField::UserId,
        TokenField::ClientId,
        TokenField::Ttl,
        TokenField::CreatedAt,
        TokenField::UpdatedAt,
    ];

    /// Serialized field name
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenField::Token => "token",
            TokenField::UserId => "user_id",
            TokenField::ClientId => "client_id",
            TokenField::Ttl => "ttl",
            TokenField::CreatedAt => "created_at",
            TokenField::UpdatedAt => "updated_at",
        }
    }

    fn differs(&self, a: &TokenRecord, b: &TokenRecord) -> bool {
        match self {
            TokenField::Token => a.token != b.token,
            TokenField::UserId => a.user_id != b.user_id,
            TokenField::ClientId => a.client_id != b.client_id,
            TokenField::Ttl => a.ttl != b.ttl,
            TokenField::CreatedAt => a.created_at != b.created_at,
            TokenField::UpdatedAt => a.updated_at != b.updated_at,
        }
    }
}

impl fmt::Display for TokenField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bearer access token entity
#[derive(Debug, Clone)]
pub struct AccessToken {
    record: TokenRecord,
    /// Fields that differ from `saved_state`
    changed: BTreeSet<TokenField>,
    /// Last remembered (persisted) state
    saved_state: Option<TokenRecord>,
}

impl AccessToken {
    /// Creates a new, never persisted token
    ///
    /// # Arguments
    ///
    /// * `token` - The token string
    /// * `user_id` - Owner of the token
    /// * `client_id` - Issuing client id
    pub fn new(token: impl Into<String>, user_id: UserId, client_id: impl Into<String>) -> Self {
        Self::new_at(token, user_id, client_id, Utc::now())
    }

    /// Creates a new, never persisted token stamped with `now`
    pub fn new_at(
        token: impl Into<String>,
        user_id: UserId,
        client_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            record: TokenRecord {
                token: token.into(),
                user_id,
                client_id: client_id.into(),
                ttl: None,
                created_at: now,
                updated_at: now,
            },
            changed: BTreeSet::new(),
            saved_state: None,
        }
    }

    /// Creates a token from data
    ///
    /// Records coming from storage (`from_storage == true`) start clean; any
    /// other record is treated as new and fully dirty.
    pub fn from_data(record: TokenRecord, from_storage: bool) -> Self {
        let mut token = Self {
            record,
            changed: BTreeSet::new(),
            saved_state: None,
        };
        if from_storage {
            token.remember_state();
        }
        token
    }

    /// Reconstructs a token read from storage
    pub fn from_record(record: TokenRecord) -> Self {
        Self::from_data(record, true)
    }

    /// Current record state
    pub fn record(&self) -> &TokenRecord {
        &self.record
    }

    /// Consumes the entity, returning its record
    pub fn into_record(self) -> TokenRecord {
        self.record
    }

    pub fn token(&self) -> &str {
        &self.record.token
    }

    pub fn user_id(&self) -> &UserId {
        &self.record.user_id
    }

    pub fn client_id(&self) -> &str {
        &self.record.client_id
    }

    pub fn ttl(&self) -> Option<i64> {
        self.record.ttl
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.record.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.record.updated_at
    }

    /// Reassigns the token to another owner
    pub fn set_user_id(&mut self, user_id: UserId) {
        self.record.user_id = user_id;
        self.track(TokenField::UserId);
    }

    pub fn set_client_id(&mut self, client_id: impl Into<String>) {
        self.record.client_id = client_id.into();
        self.track(TokenField::ClientId);
    }

    /// Sets the time to live
    ///
    /// # Arguments
    ///
    /// * `ttl` - Lifetime in seconds, `None` for a token that never expires
    /// * `overwrite_timestamps` - Also refresh `updated_at`, restarting the lifetime from now
    pub fn set_ttl(&mut self, ttl: Option<i64>, overwrite_timestamps: bool) {
        self.set_ttl_at(ttl, overwrite_timestamps, Utc::now());
    }

    /// Sets the time to live, taking the refreshed `updated_at` from `now`
    pub fn set_ttl_at(&mut self, ttl: Option<i64>, overwrite_timestamps: bool, now: DateTime<Utc>) {
        self.record.ttl = ttl;
        self.track(TokenField::Ttl);
        if overwrite_timestamps {
            self.record.updated_at = now;
            self.track(TokenField::UpdatedAt);
        }
    }

    /// Checks if the token has expired
    ///
    /// Only a defined, non-positive TTL counts as expired; a token without TTL
    /// never expires.
    pub fn is_expired(&self) -> bool {
        matches!(self.record.ttl, Some(ttl) if ttl <= 0)
    }

    /// Checks if the token belongs to a guest
    pub fn is_guest(&self) -> bool {
        self.record.user_id.is_guest()
    }

    /// Gets the expiration instant, `None` when the token never expires
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.record
            .ttl
            .map(|ttl| self.record.updated_at + Duration::seconds(ttl))
    }

    /// Gets the lifetime left at `now`, in whole seconds
    ///
    /// # Returns
    ///
    /// `None` for tokens without TTL; zero or negative once the lifetime is spent
    pub fn remaining_ttl(&self, now: DateTime<Utc>) -> Option<i64> {
        self.record
            .ttl
            .map(|ttl| ttl - (now - self.record.updated_at).num_seconds())
    }

    /// Checks if any field changed since the last remembered state
    pub fn is_changed(&self) -> bool {
        self.saved_state.is_none() || !self.changed.is_empty()
    }

    /// Gets the fields changed since the last remembered state
    ///
    /// A token that was never persisted reports every field.
    pub fn changed_fields(&self) -> Vec<TokenField> {
        if self.saved_state.is_none() {
            return TokenField::ALL.to_vec();
        }
        self.changed.iter().copied().collect()
    }

    /// Remembers the current state as persisted
    pub fn remember_state(&mut self) {
        self.saved_state = Some(self.record.clone());
        self.changed.clear();
    }

    /// Restores the last remembered state
    ///
    /// # Returns
    ///
    /// `false` when no state was remembered yet
    pub fn restore_state(&mut self) -> bool {
        match &self.saved_state {
            Some(saved) => {
                self.record = saved.clone();
                self.changed.clear();
                true
            }
            None => false,
        }
    }

    /// Replaces the token string with a freshly generated one
    ///
    /// The record stored under the previous string is left untouched.
    pub fn regenerate(&mut self, codec: &TokenCodec) {
        self.record.token = codec.generate();
        self.track(TokenField::Token);
    }

    /// Regenerates the token string until it is unused in `storage`
    ///
    /// Must be called before the token is persisted for the first time.
    ///
    /// # Errors
    ///
    /// `TokenError::UniquenessExhausted` when every one of `max_attempts`
    /// candidates already exists; store failures are propagated. The store is
    /// checked at least once, even for a zero bound.
    pub async fn ensure_uniqueness<S>(
        &mut self,
        storage: &S,
        codec: &TokenCodec,
        max_attempts: u32,
    ) -> DomainResult<()>
    where
        S: TokenStorage + ?Sized,
    {
        let max_attempts = max_attempts.max(1);
        for attempt in 1..=max_attempts {
            if !storage.token_exists(&self.record.token).await? {
                return Ok(());
            }
            warn!(
                attempt = attempt,
                max_attempts = max_attempts,
                "Generated token string already exists, regenerating"
            );
            self.regenerate(codec);
        }

        Err(TokenError::UniquenessExhausted {
            attempts: max_attempts,
        }
        .into())
    }

    /// Saves the token to storage when it has changes
    ///
    /// # Returns
    ///
    /// `true` if a write was issued, `false` if the token was unchanged
    pub async fn save<S>(&mut self, storage: &S) -> DomainResult<bool>
    where
        S: TokenStorage + ?Sized,
    {
        if !self.is_changed() {
            debug!(token = %mask_token(self.token()), "Token unchanged, skipping save");
            return Ok(false);
        }

        let changed = self.changed_fields();
        debug!(
            token = %mask_token(self.token()),
            fields = ?changed,
            "Saving token"
        );

        storage.set_token(self).await?;
        self.remember_state();
        Ok(true)
    }

    /// Removes the token from storage
    pub async fn remove<S>(&self, storage: &S) -> DomainResult<()>
    where
        S: TokenStorage + ?Sized,
    {
        storage.remove_token(self).await
    }

    fn track(&mut self, field: TokenField) {
        let differs = match &self.saved_state {
            Some(saved) => field.differs(&self.record, saved),
            None => true,
        };
        if differs {
            self.changed.insert(field);
        } else {
            self.changed.remove(&field);
        }
    }
}

impl PartialEq for AccessToken {
    fn eq(&self, other: &Self) -> bool {
        self.record == other.record
    }
}

impl Eq for AccessToken {}

impl From<TokenRecord> for AccessToken {
    fn from(record: TokenRecord) -> Self {
        Self::from_data(record, false)
    }
}

/// Mask a token string for logging
pub fn mask_token(token: &str) -> String {
    match token.get(..6) {
        Some(head) if token.len() > 12 => format!("{}***", head),
        _ => "***".to_string(),
    }
}

