//! Access token service module
//!
//! This module handles the token lifecycle on top of a [`TokenStorage`]:
//! - Token string generation and validation
//! - Creating tokens for users and guests
//! - Looking up and revoking a user's tokens
//! - Client id resolution from incoming requests
//! - Creation notifications for registered observers
//!
//! [`TokenStorage`]: crate::repositories::access_token::TokenStorage

pub mod codec;
mod events;
mod manager;
mod request;


pub use codec::{TokenCodec, DIGEST_LENGTH};
pub use events::{AccessTokenObserver, ChannelObserver, LoggingObserver, TokenEvent};
pub use manager::AccessTokenManager;
pub use request::{
    RequestInspector, RequestParts, REQUEST_CLIENT_ID_HEADER, REQUEST_CLIENT_ID_PARAM,
};
