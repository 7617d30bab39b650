//! Business services containing domain logic and use cases.

pub mod access_token;

// Re-export commonly used types
pub use access_token::{
    AccessTokenManager, AccessTokenObserver, ChannelObserver, LoggingObserver, RequestInspector,
    RequestParts, TokenCodec, TokenEvent,
};
