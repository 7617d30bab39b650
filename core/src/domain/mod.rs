//! Domain layer containing the token entity and its owner identity.

pub mod entities;

// Re-export commonly used domain types
pub use entities::*;
