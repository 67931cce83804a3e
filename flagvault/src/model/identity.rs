//! Caller identity threaded explicitly through every use case.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Maximum accepted length of an email address.
const MAX_EMAIL_LEN: usize = 254;

/// The authenticated caller of an operation.
///
/// Identities are compared by normalized (trimmed, lower-cased) email.
///
/// # Examples
///
/// ```
/// use flagvault::Identity;
///
/// let alice = Identity::new("  Alice@Example.com ").unwrap();
/// assert_eq!(alice.email(), "alice@example.com");
/// assert!(Identity::new("not-an-email").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    email: String,
}

impl Identity {
    /// Creates an identity from an email address.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the email is malformed.
    pub fn new(email: &str) -> Result<Self> {
        Ok(Self {
            email: normalize_email(email)?,
        })
    }

    /// Returns the normalized email of this identity.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Returns true if this identity owns the given (unnormalized) email.
    #[must_use]
    pub fn is(&self, email: &str) -> bool {
        self.email == email.trim().to_lowercase()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.email)
    }
}

/// Trims and lower-cases an email address, rejecting obviously invalid input.
///
/// # Errors
///
/// Returns a validation error if the address is empty, too long, contains
/// whitespace, or does not have a single `@` with text on both sides.
pub fn normalize_email(raw: &str) -> Result<String> {
    let email = raw.trim().to_lowercase();

    if email.is_empty() {
        return Err(Error::validation("email", "Cannot be empty"));
    }
    if email.len() > MAX_EMAIL_LEN {
        return Err(Error::validation(
            "email",
            format!("Cannot exceed {MAX_EMAIL_LEN} characters"),
        ));
    }
    if email.chars().any(char::is_whitespace) {
        return Err(Error::validation("email", "Cannot contain whitespace"));
    }

    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
            Ok(email)
        }
        _ => Err(Error::validation(
            "email",
            format!("'{}' is not a valid email address", raw.trim()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email_lowercases_and_trims() {
        assert_eq!(normalize_email(" Bob@Example.COM ").unwrap(), "bob@example.com");
    }

    #[test]
    fn test_normalize_email_rejects_invalid() {
        assert!(normalize_email("").is_err());
        assert!(normalize_email("   ").is_err());
        assert!(normalize_email("bob").is_err());
        assert!(normalize_email("@example.com").is_err());
        assert!(normalize_email("bob@").is_err());
        assert!(normalize_email("bob@a@b").is_err());
        assert!(normalize_email("b ob@example.com").is_err());
    }

    #[test]
    fn test_identity_is_compares_normalized() {
        let id = Identity::new("carol@example.com").unwrap();
        assert!(id.is("CAROL@example.com "));
        assert!(!id.is("dave@example.com"));
        assert_eq!(id.to_string(), "carol@example.com");
    }
}
