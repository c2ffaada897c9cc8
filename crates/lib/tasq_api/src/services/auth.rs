//! Identity authority: registration and login, issuing bearer tokens.

use chrono::Utc;
use tasq_core::auth::AuthError;
use tasq_core::auth::accounts::AccountStore;
use tasq_core::auth::jwt::{TOKEN_LIFETIME_SECS, issue_token};
use tasq_core::auth::password::{hash_secret, secret_matches};
use tasq_core::models::auth::Account;
use tasq_core::store::with_timeout;
use tasq_core::uuid::new_id;
use tasq_core::validation::ValidationErrors;
use tracing::info;

use crate::models::TokenResponse;

pub const USERNAME_MAX_CHARS: usize = 50;
pub const PASSWORD_MIN_CHARS: usize = 8;

fn validate_registration(username: &str, password: &str) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    if username.trim().is_empty() {
        errors.add("username", "Username cannot be blank");
    } else if username.chars().count() > USERNAME_MAX_CHARS {
        errors.add(
            "username",
            format!("Username must be at most {USERNAME_MAX_CHARS} characters"),
        );
    }
    if password.chars().count() < PASSWORD_MIN_CHARS {
        errors.add(
            "password",
            format!("Password must be at least {PASSWORD_MIN_CHARS} characters"),
        );
    }
    errors.into_result()
}

fn token_response(account: &Account, secret: &[u8]) -> Result<TokenResponse, AuthError> {
    Ok(TokenResponse {
        token: issue_token(&account.id, secret)?,
        token_type: "Bearer".into(),
        expires_in: TOKEN_LIFETIME_SECS,
        user_id: account.id.clone(),
        username: account.username.clone(),
    })
}

/// Create an account and sign the caller in.
pub async fn register(
    accounts: &dyn AccountStore,
    username: &str,
    password: &str,
    secret: &[u8],
    timeout: std::time::Duration,
) -> Result<TokenResponse, AuthError> {
    let username = username.trim();
    validate_registration(username, password)?;

    let account = Account {
        id: new_id(),
        username: username.to_string(),
        password_hash: hash_secret(password)?,
        created_at: Utc::now(),
    };
    if !with_timeout(timeout, accounts.insert(&account)).await? {
        return Err(AuthError::UsernameTaken(account.username));
    }
    info!(account_id = %account.id, username = %account.username, "account registered");
    token_response(&account, secret)
}

/// Exchange a username and password for a bearer token.
///
/// Unknown usernames and wrong passwords fail identically.
pub async fn login(
    accounts: &dyn AccountStore,
    username: &str,
    password: &str,
    secret: &[u8],
    timeout: std::time::Duration,
) -> Result<TokenResponse, AuthError> {
    let account = with_timeout(timeout, accounts.find_by_username(username.trim())).await?;
    let stored_hash = account.as_ref().map(|a| a.password_hash.as_str());
    if !secret_matches(password, stored_hash)? {
        return Err(AuthError::CredentialError);
    }
    let account = account.ok_or(AuthError::CredentialError)?;
    token_response(&account, secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tasq_core::auth::accounts::MemoryAccountStore;
    use tasq_core::auth::jwt::verify_token;

    const SECRET: &[u8] = b"svc-secret";
    const TIMEOUT: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn register_then_login() {
        let store = MemoryAccountStore::new();
        let registered = register(&store, "alice", "password1", SECRET, TIMEOUT)
            .await
            .unwrap();
        let claims = verify_token(&registered.token, SECRET, Utc::now()).unwrap();
        assert_eq!(claims.sub, registered.user_id);

        let logged_in = login(&store, "alice", "password1", SECRET, TIMEOUT).await.unwrap();
        assert_eq!(logged_in.user_id, registered.user_id);
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected() {
        let store = MemoryAccountStore::new();
        register(&store, "alice", "password1", SECRET, TIMEOUT).await.unwrap();
        let err = register(&store, "alice", "password2", SECRET, TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UsernameTaken(_)));
    }

    #[tokio::test]
    async fn bad_credentials_fail_the_same_way() {
        let store = MemoryAccountStore::new();
        register(&store, "alice", "password1", SECRET, TIMEOUT).await.unwrap();
        assert!(matches!(
            login(&store, "alice", "wrong-pass", SECRET, TIMEOUT).await,
            Err(AuthError::CredentialError)
        ));
        assert!(matches!(
            login(&store, "nobody", "password1", SECRET, TIMEOUT).await,
            Err(AuthError::CredentialError)
        ));
    }

    #[tokio::test]
    async fn registration_fields_are_validated() {
        let store = MemoryAccountStore::new();
        let err = register(&store, " ", "short", SECRET, TIMEOUT).await.unwrap_err();
        let AuthError::Validation(errors) = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert!(errors.fields().contains_key("username"));
        assert!(errors.fields().contains_key("password"));
    }
}
