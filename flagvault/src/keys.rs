//! Bearer token issuance and verification for API and SDK keys.
//!
//! Tokens are a fixed prefix followed by lowercase hex: `cm_` plus 48
//! characters for API keys, `rp_` plus 80 for SDK keys. Only a short lookup
//! prefix and a salted SHA-256 hash are ever stored.

use sha2::{Digest, Sha256};

use crate::database::StoredSecret;

/// Number of leading token characters stored in clear for lookup.
pub const LOOKUP_PREFIX_LEN: usize = 12;

/// The two kinds of bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Account-level API key.
    Api,
    /// Project and environment scoped SDK key.
    Sdk,
}

impl TokenKind {
    /// Literal prefix of tokens of this kind.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Api => "cm_",
            Self::Sdk => "rp_",
        }
    }

    /// Number of hex characters after the prefix.
    #[must_use]
    pub const fn hex_len(self) -> usize {
        match self {
            Self::Api => 48,
            Self::Sdk => 80,
        }
    }
}

/// Generates a new random token.
///
/// # Examples
///
/// ```
/// use flagvault::keys::{generate_token, is_well_formed, TokenKind};
///
/// let token = generate_token(TokenKind::Sdk);
/// assert!(token.starts_with("rp_"));
/// assert!(is_well_formed(TokenKind::Sdk, &token));
/// ```
#[must_use]
pub fn generate_token(kind: TokenKind) -> String {
    let words = kind.hex_len() / 16;
    let mut token = String::with_capacity(kind.prefix().len() + kind.hex_len());
    token.push_str(kind.prefix());
    for _ in 0..words {
        token.push_str(&format!("{:016x}", rand::random::<u64>()));
    }
    token
}

/// Checks the prefix, length and alphabet of a token.
#[must_use]
pub fn is_well_formed(kind: TokenKind, token: &str) -> bool {
    token.strip_prefix(kind.prefix()).is_some_and(|hex| {
        hex.len() == kind.hex_len()
            && hex
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    })
}

/// Returns the lookup prefix of a token.
#[must_use]
pub fn lookup_prefix(token: &str) -> &str {
    token.get(..LOOKUP_PREFIX_LEN).unwrap_or(token)
}

fn digest(salt: &str, token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hashes a token with a fresh random salt as `salt$sha256hex`.
#[must_use]
pub fn hash_token(token: &str) -> String {
    let salt = format!("{:016x}", rand::random::<u64>());
    let hash = digest(&salt, token);
    format!("{salt}${hash}")
}

/// Checks a token against a stored `salt$sha256hex` hash.
#[must_use]
pub fn verify_token_hash(token: &str, stored: &str) -> bool {
    let Some((salt, expected)) = stored.split_once('$') else {
        return false;
    };
    let actual = digest(salt, token);
    // Compare every byte so the time taken does not depend on where the
    // first mismatch is.
    actual.len() == expected.len()
        && actual
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

/// Builds the stored form of a freshly generated token.
pub(crate) fn stored_secret(token: &str) -> StoredSecret {
    StoredSecret {
        prefix: lookup_prefix(token).to_string(),
        hash: hash_token(token),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_shapes() {
        let api = generate_token(TokenKind::Api);
        assert_eq!(api.len(), 3 + 48);
        assert!(is_well_formed(TokenKind::Api, &api));
        assert!(!is_well_formed(TokenKind::Sdk, &api));

        let sdk = generate_token(TokenKind::Sdk);
        assert_eq!(sdk.len(), 3 + 80);
        assert!(is_well_formed(TokenKind::Sdk, &sdk));
    }

    #[test]
    fn test_malformed_tokens() {
        let valid_hex = "a".repeat(48);
        assert!(is_well_formed(TokenKind::Api, &format!("cm_{valid_hex}")));
        assert!(!is_well_formed(TokenKind::Api, &format!("cm_{}", "A".repeat(48))));
        assert!(!is_well_formed(TokenKind::Api, &format!("cm_{}", "g".repeat(48))));
        assert!(!is_well_formed(TokenKind::Api, &format!("cm_{}", "a".repeat(47))));
        assert!(!is_well_formed(TokenKind::Api, &format!("xx_{valid_hex}")));
        assert!(!is_well_formed(TokenKind::Api, ""));
    }

    #[test]
    fn test_hash_and_verify() {
        let token = generate_token(TokenKind::Api);
        let stored = hash_token(&token);
        assert!(verify_token_hash(&token, &stored));
        assert!(!verify_token_hash(&generate_token(TokenKind::Api), &stored));
        assert!(!verify_token_hash(&token, "no-separator"));

        // Salted: hashing twice gives different stored forms.
        assert_ne!(hash_token(&token), stored);
    }

    #[test]
    fn test_lookup_prefix() {
        assert_eq!(lookup_prefix("cm_0123456789abcdef"), "cm_012345678");
        assert_eq!(lookup_prefix("short"), "short");
        let secret = stored_secret("rp_0123456789abcdef");
        assert_eq!(secret.prefix, "rp_012345678");
    }
}
