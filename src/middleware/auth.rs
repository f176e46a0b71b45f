use axum::http::{header, HeaderMap};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// The authenticated caller, attached to protected requests by the gate.
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub subject: String,
    pub username: Option<String>,
    pub role: Option<String>,
    /// The bearer token the request was made with.
    pub token: String,
}

/// Returns the token of an `Authorization: Bearer <token>` header, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Resolves the bearer token in `headers` to a caller.
///
/// No header yields "Authentication required"; a token that fails
/// verification (bad signature, expired, revoked) yields "Invalid or expired
/// token". Both are `401`.
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> AppResult<AuthUser> {
    let token = bearer_token(headers).ok_or_else(AppError::authentication_required)?.to_string();
    let claims = state.tokens.verify(&token).await?.ok_or_else(AppError::invalid_token)?;
    Ok(AuthUser {
        username: claims.username().map(str::to_string),
        role: claims.role().map(str::to_string),
        subject: claims.sub,
        token,
    })
}
