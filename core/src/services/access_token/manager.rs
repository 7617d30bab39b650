//! Token lifecycle manager implementation

use std::sync::Arc;
use tracing::{debug, info};

use tc_shared::config::TokenAuthConfig;

use crate::domain::entities::access_token::{mask_token, AccessToken, TokenRecord};
use crate::domain::entities::user::{Authenticatable, UserId};
use crate::errors::{DomainResult, TokenError};
use crate::repositories::access_token::{Clock, SystemClock, TokenStorage};

use super::codec::TokenCodec;
use super::events::AccessTokenObserver;
use super::request::{RequestInspector, REQUEST_CLIENT_ID_HEADER, REQUEST_CLIENT_ID_PARAM};

/// Issues, looks up and revokes access tokens
pub struct AccessTokenManager<S: TokenStorage> {
    pub(crate) storage: S,
    config: TokenAuthConfig,
    codec: TokenCodec,
    clock: Arc<dyn Clock>,
    observers: Vec<Arc<dyn AccessTokenObserver>>,
}

impl<S: TokenStorage> AccessTokenManager<S> {
    /// Creates a new manager
    ///
    /// # Arguments
    ///
    /// * `storage` - Token store
    /// * `config` - Issuing policy (client ids, TTLs, token length)
    pub fn new(storage: S, config: TokenAuthConfig) -> Self {
        let codec = TokenCodec::with_length(config.token_length);
        Self {
            storage,
            config,
            codec,
            clock: Arc::new(SystemClock),
            observers: Vec::new(),
        }
    }

    /// Stamps created and extended tokens with `clock` instead of the wall clock
    ///
    /// Pass the clock the storage evaluates expiration against.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Registers an observer notified of every created token
    pub fn with_observer(mut self, observer: Arc<dyn AccessTokenObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn config(&self) -> &TokenAuthConfig {
        &self.config
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Creates a token for a user
    ///
    /// The token gets a unique token string but is not persisted.
    ///
    /// # Arguments
    ///
    /// * `user` - Owner of the token
    /// * `client_id` - Issuing client, the configured default when `None`
    /// * `auto_ttl` - Apply the configured user TTL
    ///
    /// # Errors
    ///
    /// `TokenError::MissingUserIdentifier` when the user has no identifier
    pub async fn create_for<U>(
        &self,
        user: &U,
        client_id: Option<&str>,
        auto_ttl: bool,
    ) -> DomainResult<AccessToken>
    where
        U: Authenticatable + ?Sized,
    {
        let owner = user
            .token_owner()
            .ok_or(TokenError::MissingUserIdentifier)?;
        let ttl = auto_ttl.then_some(self.config.ttl);
        self.create(owner, client_id, ttl).await
    }

    /// Creates a token for an unauthenticated principal
    ///
    /// Same as [`Self::create_for`] with the guest owner and the guest TTL.
    pub async fn create_for_guest(
        &self,
        client_id: Option<&str>,
        auto_ttl: bool,
    ) -> DomainResult<AccessToken> {
        let ttl = auto_ttl.then_some(self.config.ttl_guest);
        self.create(UserId::Guest, client_id, ttl).await
    }

    /// Builds a token from an existing record
    ///
    /// # Arguments
    ///
    /// * `record` - Token state
    /// * `from_storage` - The record mirrors persisted state, so the token starts clean
    pub fn create_from_data(&self, record: TokenRecord, from_storage: bool) -> AccessToken {
        AccessToken::from_data(record, from_storage)
    }

    /// Gets the newest active token of a user for a client
    ///
    /// # Returns
    ///
    /// `None` when the user has no identifier or no matching token
    pub async fn get_first_for<U>(
        &self,
        user: &U,
        client_id: Option<&str>,
    ) -> DomainResult<Option<AccessToken>>
    where
        U: Authenticatable + ?Sized,
    {
        let client_id = self.client_id_or_default(client_id);
        let tokens = self.tokens_for(user).await?;

        Ok(tokens
            .into_iter()
            .find(|token| token.client_id() == client_id))
    }

    /// Gets every active token of a user, newest first
    pub async fn tokens_for<U>(&self, user: &U) -> DomainResult<Vec<AccessToken>>
    where
        U: Authenticatable + ?Sized,
    {
        match user.token_owner() {
            Some(owner) => self.storage.load_user_tokens(&owner).await,
            None => Ok(Vec::new()),
        }
    }

    /// Revokes every active token of a user
    ///
    /// # Returns
    ///
    /// Number of revoked tokens; zero when the user has no identifier
    pub async fn remove_all_for<U>(&self, user: &U) -> DomainResult<usize>
    where
        U: Authenticatable + ?Sized,
    {
        let Some(owner) = user.token_owner() else {
            debug!("User has no identifier, nothing to revoke");
            return Ok(0);
        };

        let tokens = self.storage.load_user_tokens(&owner).await?;
        for token in &tokens {
            token.remove(&self.storage).await?;
        }

        if !tokens.is_empty() {
            info!(user_id = %owner, count = tokens.len(), "Revoked all user tokens");
        }
        Ok(tokens.len())
    }

    /// Creates and persists a token for a user
    ///
    /// # Arguments
    ///
    /// * `user` - Owner of the token
    /// * `client_id` - Issuing client, the configured default when `None`
    /// * `ttl` - Lifetime override in seconds, the configured user TTL when `None`
    pub async fn issue_for<U>(
        &self,
        user: &U,
        client_id: Option<&str>,
        ttl: Option<i64>,
    ) -> DomainResult<AccessToken>
    where
        U: Authenticatable + ?Sized,
    {
        let mut token = self.create_for(user, client_id, true).await?;
        if ttl.is_some() {
            token.set_ttl_at(ttl, true, self.clock.now());
        }
        token.save(&self.storage).await?;
        Ok(token)
    }

    /// Gets the user's token for a client, issuing one when none is active
    pub async fn token_for<U>(&self, user: &U, client_id: Option<&str>) -> DomainResult<AccessToken>
    where
        U: Authenticatable + ?Sized,
    {
        if let Some(token) = self.get_first_for(user, client_id).await? {
            return Ok(token);
        }
        self.issue_for(user, client_id, None).await
    }

    /// Resolves a presented token string
    ///
    /// Malformed strings are rejected before the store is consulted. Invalid
    /// and unknown tokens both yield `None`.
    pub async fn find_token(&self, token: &str) -> DomainResult<Option<AccessToken>> {
        if !self.validate_token_str(token) {
            debug!(token = %mask_token(token), "Rejected malformed token string");
            return Ok(None);
        }
        self.storage.get_token(token).await
    }

    /// Generates a token string with the configured length
    pub fn generate_token_str(&self) -> String {
        self.codec.generate()
    }

    /// Validates a token string against the configured length
    pub fn validate_token_str(&self, token: &str) -> bool {
        self.codec.validate(token)
    }

    /// Resolves the client id of a request
    ///
    /// The `client_id` parameter wins over the `Client-Id` header. A candidate
    /// is accepted only when it is on the allow-list; otherwise the default
    /// client id is used.
    pub fn client_id_from_request(&self, request: &dyn RequestInspector) -> String {
        let candidates = [
            request.query_param(REQUEST_CLIENT_ID_PARAM),
            request.header(REQUEST_CLIENT_ID_HEADER),
        ];

        candidates
            .into_iter()
            .flatten()
            .find(|candidate| self.config.is_client_id_allowed(candidate))
            .unwrap_or_else(|| self.config.client_id_default.clone())
    }

    async fn create(
        &self,
        owner: UserId,
        client_id: Option<&str>,
        ttl: Option<Option<i64>>,
    ) -> DomainResult<AccessToken> {
        let client_id = self.client_id_or_default(client_id);
        let now = self.clock.now();
        let mut token = AccessToken::new_at(self.codec.generate(), owner, client_id, now);

        token
            .ensure_uniqueness(
                &self.storage,
                &self.codec,
                self.config.uniqueness_max_attempts,
            )
            .await?;

        if let Some(ttl) = ttl {
            token.set_ttl_at(ttl, true, now);
        }

        info!(
            token = %mask_token(token.token()),
            user_id = %token.user_id(),
            client_id = %token.client_id(),
            "Created access token"
        );

        for observer in &self.observers {
            observer.token_created(&token);
        }

        Ok(token)
    }

    fn client_id_or_default<'a>(&'a self, client_id: Option<&'a str>) -> &'a str {
        client_id.unwrap_or(&self.config.client_id_default)
    }
}
