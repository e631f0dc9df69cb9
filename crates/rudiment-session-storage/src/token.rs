//! Random tokens and CSRF token values

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

/// Generate a 256-bit random token, base64url encoded without padding
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Compare two strings without short-circuiting on the first difference
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// CSRF token minted for the double-submit cookie protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsrfToken {
    value: String,
    /// Clock reading at mint time (millis)
    created_time: u64,
}

impl CsrfToken {
    pub fn new(value: impl Into<String>, created_time: u64) -> Self {
        Self {
            value: value.into(),
            created_time,
        }
    }

    /// Mint a fresh unguessable token
    pub fn generate(created_time: u64) -> Self {
        Self::new(generate_token(), created_time)
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn created_time(&self) -> u64 {
        self.created_time
    }

    /// Constant-time comparison against a submitted value
    pub fn matches(&self, candidate: &str) -> bool {
        constant_time_eq(&self.value, candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_token_shape() {
        let token = generate_token();
        // 32 bytes -> 43 base64url characters without padding
        assert_eq!(token.len(), 43);
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_tokens_are_unique() {
        let tokens: HashSet<String> = (0..1000).map(|_| generate_token()).collect();
        assert_eq!(tokens.len(), 1000);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "abcd"));
        assert!(constant_time_eq("", ""));
    }

    #[test]
    fn test_csrf_token_matches() {
        let token = CsrfToken::generate(10);
        assert_eq!(token.created_time(), 10);
        assert!(token.matches(&token.value().to_string()));
        assert!(!token.matches("forged"));
    }
}
