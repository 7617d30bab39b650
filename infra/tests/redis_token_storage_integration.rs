//! Integration tests for the Redis token store
//!
//! Tests marked `#[ignore]` require a running Redis instance.
//! Run with: cargo test -p tc_infra --test redis_token_storage_integration -- --ignored

use std::time::Duration;

use tc_core::{AccessToken, AccessTokenManager, TokenCodec, TokenStorage, UserId};
use tc_infra::cache::{create_token_storage, KeyExpiry, RedisTokenStorage};
use tc_shared::{CacheConfig, CacheType, TokenAuthConfig};

fn redis_config() -> CacheConfig {
    // Unique prefix per test so runs never see each other's keys
    CacheConfig::new(
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
    )
    .with_prefix(format!("tc_test:{}", uuid::Uuid::new_v4()))
    .with_retries(3, 50)
}

async fn create_storage() -> RedisTokenStorage {
    RedisTokenStorage::connect(redis_config())
        .await
        .expect("Failed to connect to Redis")
}

fn create_token(user_id: UserId, ttl: Option<i64>) -> AccessToken {
    let mut token = AccessToken::new(TokenCodec::default().generate(), user_id, "api");
    token.set_ttl(ttl, true);
    token
}

#[tokio::test]
async fn test_memory_backend_from_config() {
    let config = CacheConfig::default();
    let config = CacheConfig {
        cache_type: CacheType::Memory,
        ..config
    };

    let storage = create_token_storage(&config).await.unwrap();
    let token = create_token(UserId::from(1u64), Some(60));
    storage.set_token(&token).await.unwrap();

    assert_eq!(storage.get_token(token.token()).await.unwrap(), Some(token));
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_redis_backend_from_config() {
    let storage = create_token_storage(&redis_config()).await.unwrap();

    assert!(storage.get_user_tokens(&UserId::from(1u64)).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_token_insert_and_read() {
    let storage = create_storage().await;
    let user = UserId::from(42u64);
    let token = create_token(user.clone(), Some(60));
    let token_no_ttl = create_token(user.clone(), None);
    let token_guest = create_token(UserId::Guest, Some(10));

    for t in [&token, &token_no_ttl, &token_guest] {
        storage.set_token(t).await.unwrap();
    }

    assert_eq!(storage.get_token(token.token()).await.unwrap(), Some(token.clone()));
    assert_eq!(
        storage.get_token(token_no_ttl.token()).await.unwrap(),
        Some(token_no_ttl.clone())
    );
    assert_eq!(
        storage.get_token(token_guest.token()).await.unwrap(),
        Some(token_guest.clone())
    );

    // Native expiry follows the TTL
    let client = storage.client();
    match client.expiry(&storage.token_key(token.token())).await.unwrap() {
        KeyExpiry::ExpiresIn(ttl) => assert!(ttl > 0 && ttl <= 60),
        other => panic!("unexpected expiry {:?}", other),
    }
    assert_eq!(
        client.expiry(&storage.token_key(token_no_ttl.token())).await.unwrap(),
        KeyExpiry::Persistent
    );

    // The index holds a member without TTL, so it never expires
    let index_key = storage.user_key(&user).unwrap();
    assert_eq!(client.expiry(&index_key).await.unwrap(), KeyExpiry::Persistent);

    let missing = storage
        .get_token(&format!("{}qwerty", token.token()))
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_expired_ttl_is_not_stored() {
    let storage = create_storage().await;
    let user = UserId::from(42u64);
    let expired = create_token(user.clone(), Some(0));

    storage.set_token(&expired).await.unwrap();

    assert!(!storage.token_exists(expired.token()).await.unwrap());
    assert!(storage.get_user_tokens(&user).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_expiry_consistency() {
    let storage = create_storage().await;
    let user = UserId::from(42u64);
    let short = create_token(user.clone(), Some(1));
    let permanent = create_token(user.clone(), None);
    storage.set_token(&short).await.unwrap();
    storage.set_token(&permanent).await.unwrap();

    tokio::time::sleep(Duration::from_millis(2100)).await;

    assert!(storage.get_token(short.token()).await.unwrap().is_none());
    assert_eq!(storage.get_user_tokens(&user).await.unwrap().len(), 2);

    let loaded = storage.load_user_tokens(&user).await.unwrap();
    assert_eq!(loaded, vec![permanent.clone()]);
    assert_eq!(
        storage.get_user_tokens(&user).await.unwrap(),
        vec![permanent.token().to_string()]
    );
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_index_integrity_and_guest_exclusion() {
    let storage = create_storage().await;
    let user = UserId::from(7u64);
    let token = create_token(user.clone(), Some(60));
    let guest = create_token(UserId::Guest, Some(60));

    storage.set_token(&token).await.unwrap();
    storage.set_token(&guest).await.unwrap();
    assert_eq!(
        storage.get_user_tokens(&user).await.unwrap(),
        vec![token.token().to_string()]
    );
    assert!(storage.user_key(&UserId::Guest).is_none());
    assert!(storage.get_user_tokens(&UserId::Guest).await.unwrap().is_empty());

    storage.remove_token(&token).await.unwrap();
    assert!(storage.get_user_tokens(&user).await.unwrap().is_empty());
    assert!(!storage.token_exists(token.token()).await.unwrap());
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_get_tokens_batch() {
    let storage = create_storage().await;
    let first = create_token(UserId::from(1u64), Some(60));
    let second = create_token(UserId::from(2u64), None);
    storage.set_token(&first).await.unwrap();
    storage.set_token(&second).await.unwrap();

    assert!(storage.get_tokens(&[]).await.unwrap().is_empty());

    let ids = vec![
        first.token().to_string(),
        "not-a-token".to_string(),
        second.token().to_string(),
    ];
    let found = storage.get_tokens(&ids).await.unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found[first.token()], first);
    assert_eq!(found[second.token()], second);
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_set_user_tokens_replaces_index() {
    let storage = create_storage().await;
    let user = UserId::from(5u64);
    let kept = create_token(user.clone(), Some(120));
    let dropped = create_token(user.clone(), None);
    storage.set_token(&kept).await.unwrap();
    storage.set_token(&dropped).await.unwrap();

    storage.set_user_tokens(&user, &[kept.clone()]).await.unwrap();

    assert_eq!(
        storage.get_user_tokens(&user).await.unwrap(),
        vec![kept.token().to_string()]
    );
    let index_key = storage.user_key(&user).unwrap();
    match storage.client().expiry(&index_key).await.unwrap() {
        KeyExpiry::ExpiresIn(ttl) => assert!(ttl > 60 && ttl <= 120),
        other => panic!("unexpected expiry {:?}", other),
    }

    storage.set_user_tokens(&user, &[]).await.unwrap();
    assert_eq!(storage.client().expiry(&index_key).await.unwrap(), KeyExpiry::Missing);
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_manager_end_to_end() {
    let manager = AccessTokenManager::new(create_storage().await, TokenAuthConfig::default());
    let user = UserId::from(42u64);

    let older = manager.issue_for(&user, Some("api"), Some(60)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let newer = manager.issue_for(&user, Some("api"), Some(60)).await.unwrap();

    assert_eq!(
        manager.get_first_for(&user, Some("api")).await.unwrap(),
        Some(newer.clone())
    );
    assert_eq!(manager.find_token(older.token()).await.unwrap(), Some(older));

    assert_eq!(manager.remove_all_for(&user).await.unwrap(), 2);
    assert!(manager.find_token(newer.token()).await.unwrap().is_none());
    assert!(manager.tokens_for(&user).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_short_lived_token_never_shortens_index() {
    let storage = create_storage().await;
    let user = UserId::from(9u64);
    let long = create_token(user.clone(), Some(86_400));
    let short = create_token(user.clone(), Some(60));
    let index_key = storage.user_key(&user).unwrap();

    storage.set_token(&long).await.unwrap();
    storage.set_token(&short).await.unwrap();

    match storage.client().expiry(&index_key).await.unwrap() {
        KeyExpiry::ExpiresIn(ttl) => assert!(ttl > 86_000),
        other => panic!("unexpected expiry {:?}", other),
    }
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_concurrent_writes_keep_longest_index_expiry() {
    let storage = create_storage().await;

    for id in 0..20u64 {
        let user = UserId::from(id);
        let long = create_token(user.clone(), Some(86_400));
        let short = create_token(user.clone(), Some(60));

        let (first, second) = tokio::join!(storage.set_token(&short), storage.set_token(&long));
        first.unwrap();
        second.unwrap();

        let index_key = storage.user_key(&user).unwrap();
        match storage.client().expiry(&index_key).await.unwrap() {
            KeyExpiry::ExpiresIn(ttl) => assert!(ttl > 86_000, "index expiry cut to {}", ttl),
            other => panic!("unexpected expiry {:?}", other),
        }
    }
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_unreadable_record_is_pruned_from_index() {
    let storage = create_storage().await;
    let user = UserId::from(11u64);
    let good = create_token(user.clone(), Some(60));
    storage.set_token(&good).await.unwrap();

    let broken = TokenCodec::default().generate();
    storage
        .client()
        .set_with_expiry(&storage.token_key(&broken), "{not json", 60)
        .await
        .unwrap();
    let mut pipe = redis::pipe();
    pipe.sadd(storage.user_key(&user).unwrap(), &broken).ignore();
    storage.client().run_pipeline(&pipe).await.unwrap();

    assert!(storage.get_token(&broken).await.unwrap().is_none());
    assert_eq!(storage.load_user_tokens(&user).await.unwrap(), vec![good.clone()]);
    assert_eq!(
        storage.get_user_tokens(&user).await.unwrap(),
        vec![good.token().to_string()]
    );
}
