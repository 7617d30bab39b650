//! Domain-specific error types and error handling.

mod types;


pub use types::TokenError;

use thiserror::Error;

/// Core domain errors (general purpose)
#[derive(Error, Debug)]
pub enum DomainError {
    /// The backing key-value store failed (connectivity, protocol)
    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    // Bridge to specific error types
    #[error(transparent)]
    Token(#[from] TokenError),
}

impl DomainError {
    /// Build a storage error from any displayable store failure
    pub fn storage(error: impl std::fmt::Display) -> Self {
        DomainError::Storage {
            message: error.to_string(),
        }
    }

    /// Whether the error belongs to the store-failure class
    ///
    /// Exhausting the uniqueness retries counts as a store failure.
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            DomainError::Storage { .. }
                | DomainError::Token(TokenError::UniquenessExhausted { .. })
        )
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(error: serde_json::Error) -> Self {
        DomainError::Serialization {
            message: error.to_string(),
        }
    }
}

pub type DomainResult<T> = Result<T, DomainError>;
