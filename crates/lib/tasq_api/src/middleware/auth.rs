//! Authentication middleware: bearer verification and principal resolution.

use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use tasq_core::auth::gate::Caller;
use tasq_core::models::auth::Principal;

use crate::AppState;
use crate::error::AppError;

/// The resolved caller, stored in request extensions and extracted by handlers.
#[derive(Debug, Clone)]
pub struct CurrentPrincipal(pub Principal);

/// Axum middleware: runs the token gate on every request and, for a verified
/// credential, resolves the account and injects [`CurrentPrincipal`].
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match state.gate.authenticate(request.uri().path(), header)? {
        Caller::Anonymous => {}
        Caller::Authenticated(caller) => {
            let principal = state.principals.resolve(&caller).await?;
            request.extensions_mut().insert(CurrentPrincipal(principal));
        }
    }

    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for CurrentPrincipal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentPrincipal>()
            .cloned()
            .ok_or_else(|| AppError::Unauthenticated("Authentication required".into()))
    }
}
