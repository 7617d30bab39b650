//! Token owner identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Owner of a token record
///
/// Guests are a distinct variant rather than a reserved identifier value, so a
/// real user id can never be mistaken for the guest sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserId {
    /// An authenticated principal with an opaque identifier
    Authenticated(String),
    /// An unauthenticated principal
    Guest,
}

impl UserId {
    /// Creates an authenticated user id
    pub fn authenticated(id: impl Into<String>) -> Self {
        UserId::Authenticated(id.into())
    }

    /// Checks whether this is the guest sentinel
    pub fn is_guest(&self) -> bool {
        matches!(self, UserId::Guest)
    }

    /// Gets the identifier of an authenticated user
    ///
    /// # Returns
    ///
    /// `Some(&str)` for authenticated users, `None` for guests
    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            UserId::Authenticated(id) => Some(id),
            UserId::Guest => None,
        }
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserId::Authenticated(id) => write!(f, "{}", id),
            UserId::Guest => write!(f, "guest"),
        }
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        UserId::Authenticated(id.to_string())
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        UserId::Authenticated(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        UserId::Authenticated(id)
    }
}

/// Any principal that tokens can be issued for
///
/// Implemented by the application's user model. The identifier is treated as
/// an opaque comparable value.
pub trait Authenticatable: Send + Sync {
    /// The principal's identifier, or `None` when it has none (e.g. not yet persisted)
    fn auth_identifier(&self) -> Option<String>;

    /// The owner id to record on tokens issued for this principal
    fn token_owner(&self) -> Option<UserId> {
        self.auth_identifier().map(UserId::Authenticated)
    }
}

impl Authenticatable for UserId {
    fn auth_identifier(&self) -> Option<String> {
        self.as_identifier().map(str::to_string)
    }
}
