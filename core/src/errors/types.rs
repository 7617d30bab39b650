//! Token-specific error types
//!
//! Validation failures on the auth boundary are not errors: an invalid or
//! missing token surfaces as `None`/`false`. The variants here cover the
//! conditions a caller cannot recover from by simply treating the request as
//! unauthenticated.

use thiserror::Error;

/// Token-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Could not find an unused token string after {attempts} attempts")]
    UniquenessExhausted { attempts: u32 },

    #[error("User has no authentication identifier")]
    MissingUserIdentifier,

    #[error("Invalid token record: {reason}")]
    InvalidRecord { reason: String },
}
