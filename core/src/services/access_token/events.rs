//! Token lifecycle notifications
//!
//! Observers are registered on the manager and called after a token has been
//! created. Delivery is fire-and-forget: an observer cannot veto or fail the
//! operation that triggered it.

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

use crate::domain::entities::access_token::{mask_token, AccessToken};

/// Event published by the lifecycle manager
#[derive(Debug, Clone, PartialEq)]
pub enum TokenEvent {
    /// A new token was built (not necessarily persisted yet)
    Created(AccessToken),
}

/// Subscriber to token lifecycle notifications
pub trait AccessTokenObserver: Send + Sync {
    /// Called once for every created token
    fn token_created(&self, token: &AccessToken);
}

/// Forwards events into an unbounded channel
///
/// Events are dropped once the receiving side has been closed.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: UnboundedSender<TokenEvent>,
}

impl ChannelObserver {
    /// Creates an observer together with the receiving end of its channel
    pub fn channel() -> (Self, UnboundedReceiver<TokenEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn new(sender: UnboundedSender<TokenEvent>) -> Self {
        Self { sender }
    }
}

impl AccessTokenObserver for ChannelObserver {
    fn token_created(&self, token: &AccessToken) {
        if self.sender.send(TokenEvent::Created(token.clone())).is_err() {
            debug!(
                token = %mask_token(token.token()),
                "Token event receiver closed, dropping event"
            );
        }
    }
}

/// Writes every event to the tracing log at debug level, with the TTL
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingObserver;

impl AccessTokenObserver for LoggingObserver {
    fn token_created(&self, token: &AccessToken) {
        debug!(
            token = %mask_token(token.token()),
            user_id = %token.user_id(),
            client_id = %token.client_id(),
            ttl = ?token.ttl(),
            "Token event: created"
        );
    }
}
