//! Tests for the lazy index prune performed by `load_user_tokens`

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::domain::entities::access_token::{AccessToken, TokenRecord};
use crate::domain::entities::user::UserId;
use crate::errors::DomainError;
use crate::repositories::access_token::TokenStorage;

/// Storage double with a hand-seeded index that records every call
struct ScriptedStorage {
    records: HashMap<String, TokenRecord>,
    index: Arc<Mutex<Vec<String>>>,
    calls: Arc<Mutex<Vec<&'static str>>>,
    removed: Arc<Mutex<Vec<String>>>,
}

impl ScriptedStorage {
    fn new() -> Self {
        Self {
            records: HashMap::new(),
            index: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            removed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn with_record(mut self, record: TokenRecord) -> Self {
        self.index.lock().unwrap().push(record.token.clone());
        self.records.insert(record.token.clone(), record);
        self
    }

    fn with_stale_entry(self, token: &str) -> Self {
        self.index.lock().unwrap().push(token.to_string());
        self
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn record_call(&self, name: &'static str) {
        self.calls.lock().unwrap().push(name);
    }
}

#[async_trait]
impl TokenStorage for ScriptedStorage {
    async fn get_token(&self, token: &str) -> Result<Option<AccessToken>, DomainError> {
        self.record_call("get_token");
        Ok(self.records.get(token).cloned().map(AccessToken::from_record))
    }

    async fn get_tokens(
        &self,
        tokens: &[String],
    ) -> Result<HashMap<String, AccessToken>, DomainError> {
        self.record_call("get_tokens");
        Ok(tokens
            .iter()
            .filter_map(|token| {
                self.records
                    .get(token)
                    .map(|record| (token.clone(), AccessToken::from_record(record.clone())))
            })
            .collect())
    }

    async fn set_token(&self, _token: &AccessToken) -> Result<(), DomainError> {
        self.record_call("set_token");
        Ok(())
    }

    async fn token_exists(&self, token: &str) -> Result<bool, DomainError> {
        self.record_call("token_exists");
        Ok(self.records.contains_key(token))
    }

    async fn remove_token(&self, _token: &AccessToken) -> Result<(), DomainError> {
        self.record_call("remove_token");
        Ok(())
    }

    async fn get_user_tokens(&self, _user_id: &UserId) -> Result<Vec<String>, DomainError> {
        self.record_call("get_user_tokens");
        Ok(self.index.lock().unwrap().clone())
    }

    async fn set_user_tokens(
        &self,
        _user_id: &UserId,
        _tokens: &[AccessToken],
    ) -> Result<(), DomainError> {
        self.record_call("set_user_tokens");
        Ok(())
    }

    async fn remove_user_tokens(
        &self,
        _user_id: &UserId,
        tokens: &[String],
    ) -> Result<(), DomainError> {
        self.record_call("remove_user_tokens");
        self.index.lock().unwrap().retain(|id| !tokens.contains(id));
        self.removed.lock().unwrap().extend(tokens.iter().cloned());
        Ok(())
    }
}

fn record(token: &str, age_secs: i64) -> TokenRecord {
    let created_at = Utc::now() - Duration::seconds(age_secs);
    TokenRecord {
        token: token.to_string(),
        user_id: UserId::from(42u64),
        client_id: "api".to_string(),
        ttl: None,
        created_at,
        updated_at: created_at,
    }
}

#[tokio::test]
async fn test_empty_index_skips_batch_read() {
    let storage = ScriptedStorage::new();

    let tokens = storage.load_user_tokens(&UserId::from(42u64)).await.unwrap();

    assert!(tokens.is_empty());
    assert_eq!(storage.calls(), vec!["get_user_tokens"]);
}

#[tokio::test]
async fn test_stale_entries_are_removed_from_index() {
    let storage = ScriptedStorage::new()
        .with_record(record("alive", 10))
        .with_stale_entry("gone-1")
        .with_stale_entry("gone-2");

    let tokens = storage.load_user_tokens(&UserId::from(42u64)).await.unwrap();

    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].token(), "alive");
    assert_eq!(
        storage.removed.lock().unwrap().clone(),
        vec!["gone-1".to_string(), "gone-2".to_string()]
    );
    assert_eq!(storage.index.lock().unwrap().clone(), vec!["alive".to_string()]);
    assert_eq!(
        storage.calls(),
        vec!["get_user_tokens", "get_tokens", "remove_user_tokens"]
    );
}

#[tokio::test]
async fn test_no_prune_when_every_entry_resolves() {
    let storage = ScriptedStorage::new()
        .with_record(record("first", 10))
        .with_record(record("second", 20));

    let tokens = storage.load_user_tokens(&UserId::from(42u64)).await.unwrap();

    assert_eq!(tokens.len(), 2);
    assert!(!storage.calls().contains(&"remove_user_tokens"));
}

#[tokio::test]
async fn test_loaded_tokens_are_newest_first() {
    let storage = ScriptedStorage::new()
        .with_record(record("oldest", 300))
        .with_record(record("newest", 1))
        .with_record(record("middle", 100));

    let tokens = storage.load_user_tokens(&UserId::from(42u64)).await.unwrap();
    let order: Vec<&str> = tokens.iter().map(|t| t.token()).collect();

    assert_eq!(order, vec!["newest", "middle", "oldest"]);
    assert!(tokens.iter().all(|t| !t.is_changed()));
}

#[tokio::test]
async fn test_index_with_only_stale_entries_yields_nothing() {
    let storage = ScriptedStorage::new()
        .with_stale_entry("gone-1")
        .with_stale_entry("gone-2");

    let tokens = storage.load_user_tokens(&UserId::from(42u64)).await.unwrap();

    assert!(tokens.is_empty());
    assert!(storage.index.lock().unwrap().is_empty());
}
