//! In-memory implementation of TokenStorage
//!
//! Mirrors the Redis store's semantics (per-record expiration, per-user index
//! with its own expiration, lazy index pruning) inside the process. Expiration
//! is evaluated against an injectable [`Clock`], which lets tests simulate the
//! passage of time.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::entities::access_token::{mask_token, AccessToken, TokenRecord};
use crate::domain::entities::user::UserId;
use crate::errors::DomainError;

use super::clock::{Clock, SystemClock};
use super::r#trait::TokenStorage;

#[derive(Debug, Clone)]
struct StoredRecord {
    record: TokenRecord,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
struct UserIndex {
    members: HashSet<String>,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    records: HashMap<String, StoredRecord>,
    indexes: HashMap<UserId, UserIndex>,
}

fn is_live(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    expires_at.map_or(true, |at| at > now)
}

/// Longest of two expirations, where `None` (never) wins
fn later(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        _ => None,
    }
}

impl MemoryState {
    fn live_record(&self, token: &str, now: DateTime<Utc>) -> Option<&StoredRecord> {
        self.records
            .get(token)
            .filter(|stored| is_live(stored.expires_at, now))
    }

    fn live_index_mut(&mut self, user_id: &UserId, now: DateTime<Utc>) -> Option<&mut UserIndex> {
        let expired = self
            .indexes
            .get(user_id)
            .is_some_and(|index| !is_live(index.expires_at, now));
        if expired {
            self.indexes.remove(user_id);
        }
        self.indexes.get_mut(user_id)
    }

    fn unindex(&mut self, user_id: &UserId, token: &str, now: DateTime<Utc>) {
        if let Some(index) = self.live_index_mut(user_id, now) {
            index.members.remove(token);
            if index.members.is_empty() {
                self.indexes.remove(user_id);
            }
        }
    }
}

/// Process-local token store
///
/// Clones share the same underlying state.
#[derive(Clone)]
pub struct InMemoryTokenStorage {
    state: Arc<RwLock<MemoryState>>,
    clock: Arc<dyn Clock>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryTokenStorage {
    /// Create a store driven by the wall clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store that evaluates expiration against `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState::default())),
            clock,
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make every subsequent operation fail as if the store were unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of records physically held, including expired ones not yet evicted
    pub async fn record_count(&self) -> usize {
        self.state.read().await.records.len()
    }

    fn ensure_available(&self) -> Result<(), DomainError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DomainError::storage("in-memory token store marked unavailable"));
        }
        Ok(())
    }

    /// Native expiration for a write at `now`; `None` when the lifetime is already spent
    fn expiry_for(token: &AccessToken, now: DateTime<Utc>) -> Option<Option<DateTime<Utc>>> {
        match token.remaining_ttl(now) {
            None => Some(None),
            Some(remaining) if remaining > 0 => Some(Some(now + Duration::seconds(remaining))),
            Some(_) => None,
        }
    }
}

impl Default for InMemoryTokenStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenStorage for InMemoryTokenStorage {
    async fn get_token(&self, token: &str) -> Result<Option<AccessToken>, DomainError> {
        self.ensure_available()?;
        let now = self.clock.now();
        let state = self.state.read().await;

        Ok(state
            .live_record(token, now)
            .map(|stored| AccessToken::from_record(stored.record.clone())))
    }

    async fn get_tokens(
        &self,
        tokens: &[String],
    ) -> Result<HashMap<String, AccessToken>, DomainError> {
        if tokens.is_empty() {
            return Ok(HashMap::new());
        }
        self.ensure_available()?;
        let now = self.clock.now();
        let state = self.state.read().await;

        Ok(tokens
            .iter()
            .filter_map(|token| {
                state.live_record(token, now).map(|stored| {
                    (
                        token.clone(),
                        AccessToken::from_record(stored.record.clone()),
                    )
                })
            })
            .collect())
    }

    async fn set_token(&self, token: &AccessToken) -> Result<(), DomainError> {
        self.ensure_available()?;
        let now = self.clock.now();
        let mut state = self.state.write().await;

        let Some(expires_at) = Self::expiry_for(token, now) else {
            debug!(
                token = %mask_token(token.token()),
                "Token lifetime already spent, removing instead of storing"
            );
            state.records.remove(token.token());
            state.unindex(token.user_id(), token.token(), now);
            return Ok(());
        };

        state.records.insert(
            token.token().to_string(),
            StoredRecord {
                record: token.record().clone(),
                expires_at,
            },
        );

        if token.is_guest() {
            return Ok(());
        }

        let user_id = token.user_id().clone();
        match state.live_index_mut(&user_id, now) {
            Some(index) => {
                index.members.insert(token.token().to_string());
                index.expires_at = later(index.expires_at, expires_at);
            }
            None => {
                let mut index = UserIndex {
                    members: HashSet::new(),
                    expires_at,
                };
                index.members.insert(token.token().to_string());
                state.indexes.insert(user_id, index);
            }
        }

        Ok(())
    }

    async fn token_exists(&self, token: &str) -> Result<bool, DomainError> {
        self.ensure_available()?;
        let now = self.clock.now();
        Ok(self.state.read().await.live_record(token, now).is_some())
    }

    async fn remove_token(&self, token: &AccessToken) -> Result<(), DomainError> {
        self.ensure_available()?;
        let now = self.clock.now();
        let mut state = self.state.write().await;

        state.records.remove(token.token());
        if !token.is_guest() {
            state.unindex(token.user_id(), token.token(), now);
        }
        Ok(())
    }

    async fn get_user_tokens(&self, user_id: &UserId) -> Result<Vec<String>, DomainError> {
        if user_id.is_guest() {
            return Ok(Vec::new());
        }
        self.ensure_available()?;
        let now = self.clock.now();
        let state = self.state.read().await;

        Ok(state
            .indexes
            .get(user_id)
            .filter(|index| is_live(index.expires_at, now))
            .map(|index| index.members.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn set_user_tokens(
        &self,
        user_id: &UserId,
        tokens: &[AccessToken],
    ) -> Result<(), DomainError> {
        if user_id.is_guest() {
            return Ok(());
        }
        self.ensure_available()?;
        let now = self.clock.now();
        let mut state = self.state.write().await;

        state.indexes.remove(user_id);
        if tokens.is_empty() {
            return Ok(());
        }

        let mut index = UserIndex {
            members: HashSet::new(),
            expires_at: Some(now),
        };
        for token in tokens {
            index.members.insert(token.token().to_string());
            let expires_at = Self::expiry_for(token, now).unwrap_or(Some(now));
            index.expires_at = later(index.expires_at, expires_at);
        }
        state.indexes.insert(user_id.clone(), index);

        Ok(())
    }

    async fn remove_user_tokens(
        &self,
        user_id: &UserId,
        tokens: &[String],
    ) -> Result<(), DomainError> {
        if user_id.is_guest() || tokens.is_empty() {
            return Ok(());
        }
        self.ensure_available()?;
        let now = self.clock.now();
        let mut state = self.state.write().await;

        for token in tokens {
            state.unindex(user_id, token, now);
        }
        Ok(())
    }
}
