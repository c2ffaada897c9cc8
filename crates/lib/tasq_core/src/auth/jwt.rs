//! JWT token generation and verification.
//!
//! Tokens are HS256 with `sub` = account id and a fixed 24 hour lifetime.
//! Verification takes the current time as a parameter so it stays a pure
//! function of its inputs.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use tracing::{debug, info, warn};

use super::AuthError;
use crate::models::auth::TokenClaims;

/// Token lifetime: 24 hours.
pub const TOKEN_LIFETIME_SECS: i64 = 24 * 60 * 60;

/// Generate a signed token for `account_id`, issued now.
pub fn issue_token(account_id: &str, secret: &[u8]) -> Result<String, AuthError> {
    issue_token_at(account_id, secret, Utc::now())
}

/// Generate a signed token for `account_id` issued at `issued_at`.
pub fn issue_token_at(
    account_id: &str,
    secret: &[u8],
    issued_at: DateTime<Utc>,
) -> Result<String, AuthError> {
    let claims = TokenClaims {
        sub: account_id.to_string(),
        iat: issued_at.timestamp(),
        exp: (issued_at + Duration::seconds(TOKEN_LIFETIME_SECS)).timestamp(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| AuthError::TokenError(format!("jwt encode: {e}")))
}

/// Verify a token's signature and expiry against `now`.
///
/// Fails closed: every decode problem (signature, algorithm, shape, missing
/// claims) is `Unauthenticated`, and the reason is only logged.
pub fn verify_token(token: &str, secret: &[u8], now: DateTime<Utc>) -> Result<TokenClaims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    // Expiry is checked below against the caller-supplied clock.
    validation.validate_exp = false;
    validation.leeway = 0;
    validation.set_required_spec_claims(&["sub", "exp"]);

    let claims = decode::<TokenClaims>(token, &DecodingKey::from_secret(secret), &validation)
        .map_err(|e| {
            debug!("token rejected: {e}");
            AuthError::Unauthenticated("Invalid token".into())
        })?
        .claims;

    if claims.exp <= now.timestamp() {
        return Err(AuthError::Unauthenticated("Token expired".into()));
    }
    if claims.sub.is_empty() {
        return Err(AuthError::Unauthenticated("Invalid token".into()));
    }
    Ok(claims)
}

/// Resolve the signing secret: env var `TASQ_JWT_SECRET` → `JWT_SECRET` → persisted file.
///
/// The file is created with a random 64 character secret on first use so a
/// restarted server keeps accepting tokens it issued.
pub fn resolve_jwt_secret() -> String {
    for var in ["TASQ_JWT_SECRET", "JWT_SECRET"] {
        if let Ok(secret) = std::env::var(var)
            && !secret.is_empty()
        {
            return secret;
        }
    }
    let secret_path = jwt_secret_path();
    if let Ok(existing) = std::fs::read_to_string(&secret_path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    if let Some(parent) = secret_path.parent()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        warn!(path = %parent.display(), "cannot create secret directory: {e}");
    }
    match std::fs::write(&secret_path, &secret) {
        Ok(()) => info!(path = %secret_path.display(), "generated new JWT secret"),
        Err(e) => warn!(path = %secret_path.display(), "cannot persist JWT secret: {e}"),
    }
    secret
}

/// Path to the persisted secret file.
fn jwt_secret_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tasq")
        .join("jwt-secret")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret";

    #[test]
    fn issued_token_verifies_and_names_the_account() {
        let now = Utc::now();
        let token = issue_token_at("acct-1", SECRET, now).unwrap();
        let claims = verify_token(&token, SECRET, now).unwrap();
        assert_eq!(claims.sub, "acct-1");
        assert_eq!(claims.exp - claims.iat, TOKEN_LIFETIME_SECS);
    }

    #[test]
    fn expired_token_is_rejected() {
        let issued = Utc::now() - Duration::hours(25);
        let token = issue_token_at("acct-1", SECRET, issued).unwrap();
        let err = verify_token(&token, SECRET, Utc::now()).unwrap_err();
        assert!(matches!(err, AuthError::Unauthenticated(_)));
    }

    #[test]
    fn token_expires_exactly_at_exp() {
        let issued = Utc::now();
        let token = issue_token_at("acct-1", SECRET, issued).unwrap();
        let at_expiry = issued + Duration::seconds(TOKEN_LIFETIME_SECS);
        assert!(verify_token(&token, SECRET, at_expiry).is_err());
        assert!(verify_token(&token, SECRET, at_expiry - Duration::seconds(1)).is_ok());
    }

    #[test]
    fn wrong_key_is_rejected() {
        let token = issue_token("acct-1", SECRET).unwrap();
        assert!(verify_token(&token, b"other-secret", Utc::now()).is_err());
    }

    #[test]
    fn other_algorithm_is_rejected() {
        let claims = TokenClaims {
            sub: "acct-1".into(),
            iat: Utc::now().timestamp(),
            exp: Utc::now().timestamp() + 60,
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();
        assert!(verify_token(&token, SECRET, Utc::now()).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(verify_token("not.a.jwt", SECRET, Utc::now()).is_err());
        assert!(verify_token("", SECRET, Utc::now()).is_err());
    }

    #[test]
    fn missing_subject_is_rejected() {
        #[derive(serde::Serialize)]
        struct NoSub {
            iat: i64,
            exp: i64,
        }
        let token = encode(
            &Header::new(Algorithm::HS256),
            &NoSub {
                iat: Utc::now().timestamp(),
                exp: Utc::now().timestamp() + 60,
            },
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();
        assert!(verify_token(&token, SECRET, Utc::now()).is_err());
    }
}
