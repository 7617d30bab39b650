//! # Token Cache Core
//!
//! Core domain for cached bearer-token authentication.
//! This crate contains the access token entity, the token string codec, the
//! token storage contract with an in-memory backend, the token lifecycle
//! manager, and the error types shared by the storage backends.

pub mod domain;
pub mod services;
pub mod repositories;
pub mod errors;

// Re-export commonly used types for convenience
pub use domain::{mask_token, AccessToken, Authenticatable, TokenField, TokenRecord, UserId};
pub use errors::{DomainError, DomainResult, TokenError};
pub use repositories::{Clock, InMemoryTokenStorage, ManualClock, SystemClock, TokenStorage};
pub use services::{
    AccessTokenManager, AccessTokenObserver, ChannelObserver, LoggingObserver, RequestInspector,
    RequestParts, TokenCodec, TokenEvent,
};
