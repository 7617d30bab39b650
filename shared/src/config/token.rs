//! Token issuing policy configuration

use serde::{Deserialize, Serialize};

/// Default client id assigned when a request does not name a valid one
pub const DEFAULT_CLIENT_ID: &str = "api";

/// Default length of the random segment of a token string
pub const DEFAULT_TOKEN_LENGTH: usize = 60;

/// Default TTL for tokens issued to authenticated users (1 day)
pub const DEFAULT_USER_TTL: i64 = 86_400;

/// Default TTL for guest tokens (1 hour)
pub const DEFAULT_GUEST_TTL: i64 = 3_600;

/// Default number of generate-and-check rounds before giving up on a unique token
pub const DEFAULT_UNIQUENESS_ATTEMPTS: u32 = 10;

/// Token authentication configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TokenAuthConfig {
    /// Client id used when none (or an unlisted one) is supplied
    #[serde(default = "default_client_id")]
    pub client_id_default: String,

    /// Allow-list of accepted client ids
    #[serde(default = "default_client_ids")]
    pub client_ids: Vec<String>,

    /// TTL in seconds for user tokens, `None` for tokens that never expire
    #[serde(default = "default_user_ttl")]
    pub ttl: Option<i64>,

    /// TTL in seconds for guest tokens, `None` for tokens that never expire
    #[serde(default = "default_guest_ttl")]
    pub ttl_guest: Option<i64>,

    /// Length of the random segment of a token string
    #[serde(default = "default_token_length")]
    pub token_length: usize,

    /// Upper bound on regeneration rounds while looking for an unused token
    #[serde(default = "default_uniqueness_attempts")]
    pub uniqueness_max_attempts: u32,
}

impl Default for TokenAuthConfig {
    fn default() -> Self {
        Self {
            client_id_default: default_client_id(),
            client_ids: default_client_ids(),
            ttl: default_user_ttl(),
            ttl_guest: default_guest_ttl(),
            token_length: default_token_length(),
            uniqueness_max_attempts: default_uniqueness_attempts(),
        }
    }
}

impl TokenAuthConfig {
    /// Create from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create from an arbitrary key lookup (environment, secrets store, test map)
    ///
    /// Recognised keys:
    /// - `AUTH_TOKEN_CLIENT_ID_DEFAULT`
    /// - `AUTH_TOKEN_CLIENT_IDS` (comma separated)
    /// - `AUTH_TOKEN_TTL` / `AUTH_TOKEN_TTL_GUEST` (`0` or `none` disables expiry)
    /// - `AUTH_TOKEN_LENGTH`
    /// - `AUTH_TOKEN_UNIQUENESS_ATTEMPTS`
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let client_id_default = lookup("AUTH_TOKEN_CLIENT_ID_DEFAULT")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.client_id_default);

        let client_ids = lookup("AUTH_TOKEN_CLIENT_IDS")
            .map(|v| {
                v.split(',')
                    .map(|id| id.trim().to_string())
                    .filter(|id| !id.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|ids| !ids.is_empty())
            .unwrap_or_else(|| vec![client_id_default.clone()]);

        let ttl = lookup("AUTH_TOKEN_TTL")
            .map(|v| parse_ttl(&v, defaults.ttl))
            .unwrap_or(defaults.ttl);

        let ttl_guest = lookup("AUTH_TOKEN_TTL_GUEST")
            .map(|v| parse_ttl(&v, defaults.ttl_guest))
            .unwrap_or(defaults.ttl_guest);

        let token_length = lookup("AUTH_TOKEN_LENGTH")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(defaults.token_length);

        let uniqueness_max_attempts = lookup("AUTH_TOKEN_UNIQUENESS_ATTEMPTS")
            .and_then(|v| v.trim().parse().ok())
            .filter(|attempts| *attempts > 0)
            .unwrap_or(defaults.uniqueness_max_attempts);

        Self {
            client_id_default,
            client_ids,
            ttl,
            ttl_guest,
            token_length,
            uniqueness_max_attempts,
        }
    }

    /// Set the default client id, keeping it on the allow-list
    pub fn with_default_client_id(mut self, client_id: impl Into<String>) -> Self {
        let client_id = client_id.into();
        if !self.client_ids.contains(&client_id) {
            self.client_ids.push(client_id.clone());
        }
        self.client_id_default = client_id;
        self
    }

    /// Replace the client id allow-list
    pub fn with_client_ids<I, S>(mut self, client_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.client_ids = client_ids.into_iter().map(Into::into).collect();
        self
    }

    /// Set the user and guest TTLs
    pub fn with_ttls(mut self, ttl: Option<i64>, ttl_guest: Option<i64>) -> Self {
        self.ttl = ttl;
        self.ttl_guest = ttl_guest;
        self
    }

    /// Set the random segment length
    pub fn with_token_length(mut self, token_length: usize) -> Self {
        self.token_length = token_length;
        self
    }

    /// Check a client id against the allow-list
    pub fn is_client_id_allowed(&self, client_id: &str) -> bool {
        self.client_ids.iter().any(|id| id == client_id)
    }
}

fn parse_ttl(raw: &str, fallback: Option<i64>) -> Option<i64> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("none") {
        return None;
    }
    match raw.parse::<i64>() {
        Ok(0) => None,
        Ok(seconds) => Some(seconds),
        Err(_) => fallback,
    }
}

fn default_client_id() -> String {
    DEFAULT_CLIENT_ID.to_string()
}

fn default_client_ids() -> Vec<String> {
    vec![default_client_id()]
}

fn default_user_ttl() -> Option<i64> {
    Some(DEFAULT_USER_TTL)
}

fn default_guest_ttl() -> Option<i64> {
    Some(DEFAULT_GUEST_TTL)
}

fn default_token_length() -> usize {
    DEFAULT_TOKEN_LENGTH
}

fn default_uniqueness_attempts() -> u32 {
    DEFAULT_UNIQUENESS_ATTEMPTS
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_token_config_default() {
        let config = TokenAuthConfig::default();
        assert_eq!(config.client_id_default, "api");
        assert_eq!(config.client_ids, vec!["api".to_string()]);
        assert_eq!(config.token_length, 60);
        assert_eq!(config.ttl, Some(86_400));
        assert_eq!(config.ttl_guest, Some(3_600));
        assert_eq!(config.uniqueness_max_attempts, 10);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = TokenAuthConfig::from_lookup(lookup_from(&[
            ("AUTH_TOKEN_CLIENT_ID_DEFAULT", "web"),
            ("AUTH_TOKEN_CLIENT_IDS", "web, mobile ,,api"),
            ("AUTH_TOKEN_TTL", "120"),
            ("AUTH_TOKEN_TTL_GUEST", "none"),
            ("AUTH_TOKEN_LENGTH", "32"),
        ]));

        assert_eq!(config.client_id_default, "web");
        assert_eq!(config.client_ids, vec!["web", "mobile", "api"]);
        assert_eq!(config.ttl, Some(120));
        assert_eq!(config.ttl_guest, None);
        assert_eq!(config.token_length, 32);
    }

    #[test]
    fn test_from_lookup_allow_list_follows_default() {
        let config = TokenAuthConfig::from_lookup(lookup_from(&[(
            "AUTH_TOKEN_CLIENT_ID_DEFAULT",
            "mobile",
        )]));

        assert_eq!(config.client_ids, vec!["mobile".to_string()]);
    }

    #[test]
    fn test_zero_ttl_means_no_expiry() {
        let config = TokenAuthConfig::from_lookup(lookup_from(&[("AUTH_TOKEN_TTL", "0")]));
        assert_eq!(config.ttl, None);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = TokenAuthConfig::from_lookup(lookup_from(&[
            ("AUTH_TOKEN_TTL", "soon"),
            ("AUTH_TOKEN_LENGTH", "-1"),
            ("AUTH_TOKEN_UNIQUENESS_ATTEMPTS", "0"),
        ]));

        assert_eq!(config.ttl, Some(DEFAULT_USER_TTL));
        assert_eq!(config.token_length, DEFAULT_TOKEN_LENGTH);
        assert_eq!(config.uniqueness_max_attempts, DEFAULT_UNIQUENESS_ATTEMPTS);
    }

    #[test]
    fn test_client_id_allow_list() {
        let config = TokenAuthConfig::default()
            .with_client_ids(["api", "admin"])
            .with_default_client_id("mobile");

        assert!(config.is_client_id_allowed("admin"));
        assert!(config.is_client_id_allowed("mobile"));
        assert!(!config.is_client_id_allowed("Admin"));
        assert_eq!(config.client_id_default, "mobile");
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: TokenAuthConfig = serde_json::from_str(r#"{"ttl": null}"#).unwrap();
        assert_eq!(config.ttl, None);
        assert_eq!(config.ttl_guest, Some(DEFAULT_GUEST_TTL));
        assert_eq!(config.client_id_default, "api");
    }
}
