//! Authentication: bearer-token verification, principal resolution and the
//! credential primitives the identity authority issues tokens with.
//!
//! Nothing here keeps session state. A request is authenticated by
//! [`gate::TokenGate`] from its header alone and resolved to a live account by
//! [`principal::PrincipalResolver`]; the resulting [`Principal`] is passed
//! explicitly to every ownership-scoped operation.
//!
//! [`Principal`]: crate::models::auth::Principal

pub mod accounts;
pub mod gate;
pub mod jwt;
pub mod password;
pub mod principal;

use thiserror::Error;

use crate::error::ErrorKind;
use crate::store::StoreError;
use crate::validation::ValidationErrors;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Bad, expired or absent-where-required credential, or an unknown account.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Invalid credentials")]
    CredentialError,

    #[error("Username already registered: {0}")]
    UsernameTaken(String),

    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error("Token error: {0}")]
    TokenError(String),

    #[error("Account store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// The stable core kind, if this error has one.
    ///
    /// `UsernameTaken` and the internal failures belong to the identity
    /// authority, not to the core taxonomy.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            AuthError::Unauthenticated(_) | AuthError::CredentialError => {
                Some(ErrorKind::Unauthenticated)
            }
            AuthError::Validation(_) => Some(ErrorKind::ValidationFailed),
            AuthError::Store(_) => Some(ErrorKind::StoreUnavailable),
            AuthError::UsernameTaken(_) | AuthError::TokenError(_) | AuthError::Internal(_) => {
                None
            }
        }
    }
}
