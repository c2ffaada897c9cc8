//! Credential hashing via bcrypt.

use std::sync::OnceLock;

use super::AuthError;

/// bcrypt cost factor.
const BCRYPT_COST: u32 = 10;

/// Hash a secret with bcrypt (cost 10).
pub fn hash_secret(secret: &str) -> Result<String, AuthError> {
    bcrypt::hash(secret, BCRYPT_COST).map_err(|e| AuthError::Internal(format!("bcrypt hash: {e}")))
}

/// Check `secret` against a stored hash.
///
/// With no stored hash (unknown username) the secret is still run through
/// bcrypt against a throwaway hash, so both failure paths cost the same and
/// response timing does not reveal which usernames exist.
pub fn secret_matches(secret: &str, stored_hash: Option<&str>) -> Result<bool, AuthError> {
    match stored_hash {
        Some(hash) => bcrypt::verify(secret, hash)
            .map_err(|e| AuthError::Internal(format!("bcrypt verify: {e}"))),
        None => {
            if let Some(dummy) = dummy_hash() {
                let _ = bcrypt::verify(secret, dummy);
            }
            Ok(false)
        }
    }
}

fn dummy_hash() -> Option<&'static str> {
    static DUMMY: OnceLock<Option<String>> = OnceLock::new();
    DUMMY
        .get_or_init(|| bcrypt::hash("tasq-timing-equalizer", BCRYPT_COST).ok())
        .as_deref()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_match() {
        let hash = hash_secret("correct horse").unwrap();
        assert!(secret_matches("correct horse", Some(&hash)).unwrap());
        assert!(!secret_matches("battery staple", Some(&hash)).unwrap());
    }

    #[test]
    fn unknown_account_never_matches() {
        assert!(!secret_matches("anything", None).unwrap());
    }
}
