//! Signing key generation
//!
//! Produces random URL-safe tokens used as key signatures.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;

use crate::domain::signing_key::DEFAULT_BYTE_LENGTH;

/// Generator for random key signatures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyGenerator {
    /// Number of random bytes per token
    byte_length: usize,
}

impl KeyGenerator {
    /// Create a generator producing tokens from `byte_length` random bytes
    /// (0 selects the default of 24 bytes)
    pub fn new(byte_length: usize) -> Self {
        Self {
            byte_length: if byte_length == 0 {
                DEFAULT_BYTE_LENGTH
            } else {
                byte_length
            },
        }
    }

    pub fn byte_length(&self) -> usize {
        self.byte_length
    }

    /// Generate a token of the configured size
    pub fn generate(&self) -> String {
        self.generate_with_length(self.byte_length)
    }

    /// Generate a token from `byte_length` random bytes (0 = configured size)
    pub fn generate_with_length(&self, byte_length: usize) -> String {
        let byte_length = if byte_length == 0 {
            self.byte_length
        } else {
            byte_length
        };

        let mut random_bytes = vec![0u8; byte_length];
        rand::thread_rng().fill_bytes(&mut random_bytes);

        URL_SAFE_NO_PAD.encode(&random_bytes)
    }
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_BYTE_LENGTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_default_token_length() {
        let generator = KeyGenerator::default();
        let token = generator.generate();

        // 24 bytes base64-encoded = 32 chars
        assert_eq!(token.len(), 32);
    }

    #[test]
    fn test_zero_length_uses_default() {
        let generator = KeyGenerator::new(0);

        assert_eq!(generator.byte_length(), DEFAULT_BYTE_LENGTH);
        assert_eq!(generator.generate_with_length(0).len(), 32);
    }

    #[test]
    fn test_custom_length() {
        let generator = KeyGenerator::new(64);

        // 64 bytes base64-encoded = 86 chars
        assert_eq!(generator.generate().len(), 86);
        assert_eq!(generator.generate_with_length(3).len(), 4);
    }

    #[test]
    fn test_url_safe_charset() {
        let token = KeyGenerator::default().generate_with_length(256);

        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_token_uniqueness() {
        let generator = KeyGenerator::default();
        let tokens: HashSet<String> = (0..100).map(|_| generator.generate()).collect();

        assert_eq!(tokens.len(), 100);
    }
}
