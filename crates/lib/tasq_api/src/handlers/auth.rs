//! Authentication request handlers.

use axum::Json;
use axum::extract::State;

use crate::AppState;
use crate::error::AppResult;
use crate::models::{LoginRequest, RegisterRequest, TokenResponse};
use crate::services::auth;

/// `POST /auth/register`: create an account and return a token.
pub async fn register_handler(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> AppResult<Json<TokenResponse>> {
    let resp = auth::register(
        state.accounts.as_ref(),
        &body.username,
        &body.password,
        state.config.jwt_secret.as_bytes(),
        state.config.sync.store_timeout,
    )
    .await?;
    Ok(Json(resp))
}

/// `POST /auth/login`: authenticate with username + password.
pub async fn login_handler(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<TokenResponse>> {
    let resp = auth::login(
        state.accounts.as_ref(),
        &body.username,
        &body.password,
        state.config.jwt_secret.as_bytes(),
        state.config.sync.store_timeout,
    )
    .await?;
    Ok(Json(resp))
}
