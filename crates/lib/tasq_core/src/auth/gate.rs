//! Per-request bearer-token gate.

use chrono::{DateTime, Utc};
use tracing::debug;

use super::AuthError;
use super::jwt::verify_token;
use crate::models::auth::CallerId;

/// Outcome of passing a request through the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    /// No usable `Bearer` credential on a public path.
    Anonymous,
    /// Verified credential; the account still has to be resolved.
    Authenticated(CallerId),
}

/// Paths reachable without a credential.
#[derive(Debug, Clone)]
pub struct PublicPaths {
    exact: Vec<String>,
    prefixes: Vec<String>,
}

impl Default for PublicPaths {
    /// Credential issuance, health, and static assets.
    fn default() -> Self {
        Self::new(
            ["/", "/index.html", "/health"],
            ["/auth/", "/js/", "/css/"],
        )
    }
}

impl PublicPaths {
    pub fn new<E, P>(exact: E, prefixes: P) -> Self
    where
        E: IntoIterator,
        E::Item: Into<String>,
        P: IntoIterator,
        P::Item: Into<String>,
    {
        Self {
            exact: exact.into_iter().map(Into::into).collect(),
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn allows(&self, path: &str) -> bool {
        self.exact.iter().any(|p| p == path) || self.prefixes.iter().any(|p| path.starts_with(p))
    }
}

/// Verifies bearer credentials with the shared signing key.
///
/// Holds no mutable state; one instance serves every request.
#[derive(Debug, Clone)]
pub struct TokenGate {
    secret: Vec<u8>,
    public: PublicPaths,
}

impl TokenGate {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            public: PublicPaths::default(),
        }
    }

    pub fn with_public_paths(mut self, public: PublicPaths) -> Self {
        self.public = public;
        self
    }

    pub fn public_paths(&self) -> &PublicPaths {
        &self.public
    }

    /// Authenticate a request for `path` from its raw `Authorization` header.
    pub fn authenticate(&self, path: &str, header: Option<&str>) -> Result<Caller, AuthError> {
        self.authenticate_at(path, header, Utc::now())
    }

    /// [`authenticate`](Self::authenticate) against an explicit clock.
    ///
    /// A header without a `Bearer ` credential counts as anonymous. A present
    /// credential is always verified, on public paths too: an invalid token
    /// is never downgraded to anonymous access.
    pub fn authenticate_at(
        &self,
        path: &str,
        header: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Caller, AuthError> {
        let token = header
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty());

        let Some(token) = token else {
            if self.public.allows(path) {
                return Ok(Caller::Anonymous);
            }
            debug!(path, "anonymous request to protected path");
            return Err(AuthError::Unauthenticated(
                "Missing or malformed authorization header".into(),
            ));
        };

        let claims = verify_token(token, &self.secret, now)?;
        Ok(Caller::Authenticated(CallerId(claims.sub)))
    }
}
