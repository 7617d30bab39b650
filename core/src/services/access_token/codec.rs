//! Self-certifying token string format
//!
//! A token is a random alphanumeric segment of length `L` with the hex SHA-256
//! digest of that segment spliced in at `ceil(L / 2)`:
//!
//! ```text
//! segment[..ceil(L/2)] + digest + segment[ceil(L/2)..]
//! ```
//!
//! Alphabetic digest characters are upper-cased at random; validation compares
//! case-insensitively. Malformed or tampered strings are rejected without a
//! store lookup.

use constant_time_eq::constant_time_eq;
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};

use tc_shared::config::token::DEFAULT_TOKEN_LENGTH;

/// Length of the embedded digest (hex encoded SHA-256)
pub const DIGEST_LENGTH: usize = 64;

/// Generator and validator for token strings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenCodec {
    length: usize,
}

impl Default for TokenCodec {
    fn default() -> Self {
        Self::with_length(DEFAULT_TOKEN_LENGTH)
    }
}

impl TokenCodec {
    /// Creates a codec for random segments of `length` characters
    pub fn with_length(length: usize) -> Self {
        Self { length }
    }

    /// Length of the random segment
    pub fn length(&self) -> usize {
        self.length
    }

    /// Total length of every token this codec produces
    pub fn token_length(&self) -> usize {
        self.length + DIGEST_LENGTH
    }

    /// Generates a new token string
    pub fn generate(&self) -> String {
        let mut rng = rand::thread_rng();

        let segment: String = (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(self.length)
            .map(char::from)
            .collect();

        let digest: String = digest_hex(&segment)
            .chars()
            .map(|c| {
                if c.is_ascii_alphabetic() && rng.gen_bool(0.5) {
                    c.to_ascii_uppercase()
                } else {
                    c
                }
            })
            .collect();

        let split = self.split_point();
        let mut token = String::with_capacity(self.token_length());
        token.push_str(&segment[..split]);
        token.push_str(&digest);
        token.push_str(&segment[split..]);
        token
    }

    /// Validates a token string
    ///
    /// # Returns
    ///
    /// `true` iff the length is `L + 64` and the embedded digest matches the
    /// digest of the surrounding segment, ignoring case
    pub fn validate(&self, token: &str) -> bool {
        if !token.is_ascii() || token.len() != self.token_length() {
            return false;
        }

        let split = self.split_point();
        let digest_end = split + DIGEST_LENGTH;

        let mut segment = String::with_capacity(self.length);
        segment.push_str(&token[..split]);
        segment.push_str(&token[digest_end..]);

        let embedded = token[split..digest_end].to_ascii_lowercase();
        let expected = digest_hex(&segment);

        constant_time_eq(embedded.as_bytes(), expected.as_bytes())
    }

    fn split_point(&self) -> usize {
        self.length.div_ceil(2)
    }
}

fn digest_hex(segment: &str) -> String {
    hex::encode(Sha256::digest(segment.as_bytes()))
}
