//! Token storage trait defining the contract of the token store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::entities::access_token::AccessToken;
use crate::domain::entities::user::UserId;
use crate::errors::DomainError;

/// Key-value persistence for token records with a per-user index
///
/// Implementations keep two kinds of state:
/// - the token record, keyed by token string, carrying the store's native
///   expiration when the token has a TTL
/// - a per-user index: the set of token strings issued to that user
///
/// Writing a record and updating the index are separate store operations. An
/// index entry may therefore outlive its record; such stale entries are pruned
/// lazily by [`TokenStorage::load_user_tokens`]. Guest tokens are never indexed.
///
/// Store failures are returned as `DomainError::Storage` and are not retried
/// here; retry policy belongs to the store client.
#[async_trait]
pub trait TokenStorage: Send + Sync {
    /// Fetch a single token
    ///
    /// # Returns
    /// * `Ok(Some(AccessToken))` - Token found and not expired
    /// * `Ok(None)` - Token missing or expired
    /// * `Err(DomainError)` - Store failure
    async fn get_token(&self, token: &str) -> Result<Option<AccessToken>, DomainError>;

    /// Fetch several tokens at once
    ///
    /// Missing and expired tokens are omitted. An empty input returns an empty
    /// map without touching the store.
    async fn get_tokens(&self, tokens: &[String])
        -> Result<HashMap<String, AccessToken>, DomainError>;

    /// Upsert a token record and index it under its owner
    ///
    /// The TTL becomes the record's native expiration. A token whose lifetime
    /// is already spent is removed (record and index entry) instead of written.
    async fn set_token(&self, token: &AccessToken) -> Result<(), DomainError>;

    /// Check whether a record exists for the token string (index not consulted)
    async fn token_exists(&self, token: &str) -> Result<bool, DomainError>;

    /// Delete a token record and drop it from its owner's index
    async fn remove_token(&self, token: &AccessToken) -> Result<(), DomainError>;

    /// Read the token strings indexed for a user
    ///
    /// Entries may reference expired records; use [`TokenStorage::load_user_tokens`]
    /// for a view of currently active tokens.
    async fn get_user_tokens(&self, user_id: &UserId) -> Result<Vec<String>, DomainError>;

    /// Replace a user's index with exactly the given tokens
    async fn set_user_tokens(
        &self,
        user_id: &UserId,
        tokens: &[AccessToken],
    ) -> Result<(), DomainError>;

    /// Drop token strings from a user's index without touching the records
    async fn remove_user_tokens(
        &self,
        user_id: &UserId,
        tokens: &[String],
    ) -> Result<(), DomainError>;

    /// Resolve a user's indexed tokens, pruning entries whose record is gone
    ///
    /// # Returns
    /// Active tokens, newest first (by creation time, ties by token string)
    async fn load_user_tokens(&self, user_id: &UserId) -> Result<Vec<AccessToken>, DomainError> {
        let ids = self.get_user_tokens(user_id).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut resolved = self.get_tokens(&ids).await?;

        let stale: Vec<String> = ids
            .iter()
            .filter(|id| !resolved.contains_key(id.as_str()))
            .cloned()
            .collect();

        if !stale.is_empty() {
            warn!(
                user_id = %user_id,
                stale = stale.len(),
                "Pruning index entries without a live token record"
            );
            self.remove_user_tokens(user_id, &stale).await?;
        }

        let mut tokens: Vec<AccessToken> = ids
            .iter()
            .filter_map(|id| resolved.remove(id.as_str()))
            .collect();
        tokens.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| a.token().cmp(b.token()))
        });

        debug!(user_id = %user_id, count = tokens.len(), "Loaded user tokens");

        Ok(tokens)
    }
}

#[async_trait]
impl<T: TokenStorage + ?Sized> TokenStorage for Arc<T> {
    async fn get_token(&self, token: &str) -> Result<Option<AccessToken>, DomainError> {
        (**self).get_token(token).await
    }

    async fn get_tokens(
        &self,
        tokens: &[String],
    ) -> Result<HashMap<String, AccessToken>, DomainError> {
        (**self).get_tokens(tokens).await
    }

    async fn set_token(&self, token: &AccessToken) -> Result<(), DomainError> {
        (**self).set_token(token).await
    }

    async fn token_exists(&self, token: &str) -> Result<bool, DomainError> {
        (**self).token_exists(token).await
    }

    async fn remove_token(&self, token: &AccessToken) -> Result<(), DomainError> {
        (**self).remove_token(token).await
    }

    async fn get_user_tokens(&self, user_id: &UserId) -> Result<Vec<String>, DomainError> {
        (**self).get_user_tokens(user_id).await
    }

    async fn set_user_tokens(
        &self,
        user_id: &UserId,
        tokens: &[AccessToken],
    ) -> Result<(), DomainError> {
        (**self).set_user_tokens(user_id, tokens).await
    }

    async fn remove_user_tokens(
        &self,
        user_id: &UserId,
        tokens: &[String],
    ) -> Result<(), DomainError> {
        (**self).remove_user_tokens(user_id, tokens).await
    }

    async fn load_user_tokens(&self, user_id: &UserId) -> Result<Vec<AccessToken>, DomainError> {
        (**self).load_user_tokens(user_id).await
    }
}
