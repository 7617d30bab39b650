//! Read-only view of an incoming request used for client id resolution.

use std::collections::HashMap;

/// Query or body parameter carrying the client id
pub const REQUEST_CLIENT_ID_PARAM: &str = "client_id";

/// Header carrying the client id
pub const REQUEST_CLIENT_ID_HEADER: &str = "Client-Id";

/// Lookup of named request parameters and headers
///
/// Implemented by the HTTP layer of the embedding application.
pub trait RequestInspector: Send + Sync {
    /// Value of the named query parameter, if present
    fn query_param(&self, name: &str) -> Option<String>;

    /// Value of the named header, if present
    ///
    /// Header names are matched case-insensitively.
    fn header(&self, name: &str) -> Option<String>;
}

/// Plain map-backed request, for callers without an HTTP framework at hand
#[derive(Debug, Clone, Default)]
pub struct RequestParts {
    params: HashMap<String, String>,
    headers: HashMap<String, String>,
}

impl RequestParts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }
}

impl RequestInspector for RequestParts {
    fn query_param(&self, name: &str) -> Option<String> {
        self.params.get(name).cloned()
    }

    fn header(&self, name: &str) -> Option<String> {
        self.headers.get(&name.to_ascii_lowercase()).cloned()
    }
}
