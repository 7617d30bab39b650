//! Integration tests for the token lifecycle against the in-memory store

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tc_core::{
        AccessTokenManager, ChannelObserver, InMemoryTokenStorage, ManualClock, RequestParts,
        TokenEvent, TokenStorage, UserId,
    };
    use tc_shared::TokenAuthConfig;

    fn create_manager() -> (AccessTokenManager<InMemoryTokenStorage>, ManualClock) {
        let clock = ManualClock::new();
        let storage = InMemoryTokenStorage::with_clock(Arc::new(clock.clone()));
        let config = TokenAuthConfig::default()
            .with_client_ids(["api", "web"])
            .with_ttls(Some(300), Some(60));
        let manager =
            AccessTokenManager::new(storage, config).with_clock(Arc::new(clock.clone()));
        (manager, clock)
    }

    #[tokio::test]
    async fn test_login_request_logout_flow() {
        let (observer, mut events) = ChannelObserver::channel();
        let (manager, _clock) = create_manager();
        let manager = manager.with_observer(Arc::new(observer));
        let user = UserId::from(42u64);

        // Login from the web client
        let request = RequestParts::new().with_header("Client-Id", "web");
        let client_id = manager.client_id_from_request(&request);
        let issued = manager.issue_for(&user, Some(&client_id), None).await.unwrap();
        assert_eq!(issued.client_id(), "web");
        assert_eq!(issued.ttl(), Some(300));
        assert!(matches!(events.try_recv(), Ok(TokenEvent::Created(_))));

        // Authenticated request presenting the bearer token
        let resolved = manager.find_token(issued.token()).await.unwrap().unwrap();
        assert_eq!(resolved.user_id(), &user);

        // Logout everywhere
        assert_eq!(manager.remove_all_for(&user).await.unwrap(), 1);
        assert!(manager.find_token(issued.token()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_guest_tokens_expire_and_stay_unindexed() {
        let (manager, clock) = create_manager();

        let mut guest = manager.create_for_guest(None, true).await.unwrap();
        guest.save(manager.storage()).await.unwrap();

        assert!(manager.find_token(guest.token()).await.unwrap().is_some());
        assert!(manager
            .storage()
            .get_user_tokens(&UserId::Guest)
            .await
            .unwrap()
            .is_empty());

        clock.advance_secs(61);
        assert!(manager.find_token(guest.token()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refreshing_ttl_extends_lifetime() {
        let (manager, clock) = create_manager();
        let user = UserId::from(7u64);

        let mut token = manager.issue_for(&user, None, Some(100)).await.unwrap();

        clock.advance_secs(90);
        token.set_ttl(Some(100), false);
        // Unchanged TTL and timestamps: nothing to write
        assert!(!token.save(manager.storage()).await.unwrap());

        let mut token = manager.find_token(token.token()).await.unwrap().unwrap();
        token.set_ttl(Some(200), false);
        assert!(token.save(manager.storage()).await.unwrap());

        clock.advance_secs(50);
        assert!(manager.find_token(token.token()).await.unwrap().is_some());
        assert_eq!(manager.tokens_for(&user).await.unwrap().len(), 1);
    }
}
