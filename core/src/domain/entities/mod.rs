//! Domain entities representing core business objects.

pub mod access_token;
pub mod user;


// Re-export commonly used types
pub use access_token::{mask_token, AccessToken, TokenField, TokenRecord};
pub use user::{Authenticatable, UserId};
