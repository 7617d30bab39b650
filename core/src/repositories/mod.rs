pub mod access_token;

pub use access_token::{Clock, InMemoryTokenStorage, ManualClock, SystemClock, TokenStorage};
