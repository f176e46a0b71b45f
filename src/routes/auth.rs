use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use serde_json::{Map, Value};

use crate::auth::password::{hash_password, verify_dummy, verify_password};
use crate::error::{validation, AppError, AppResult};
use crate::extract::ApiJson;
use crate::middleware::auth::{authenticate, bearer_token};
use crate::middleware::AuthUser;
use crate::state::AppState;
use crate::store::UserRecord;
use crate::types::{
    AuthResponse, CsrfTokenResponse, LoginRequest, RefreshRequest, RegisterRequest, SuccessResponse, UserDto,
    VerifyResponse,
};

pub const DEFAULT_ROLE: &str = "user";

fn claims_for(user: &UserRecord) -> Map<String, Value> {
    let mut claims = Map::new();
    claims.insert("username".into(), Value::String(user.username.clone()));
    claims.insert("role".into(), Value::String(user.role.clone()));
    claims
}

/// Mints a bearer token for `user`, plus a CSRF token when the policy enforces CSRF.
async fn sign_in(state: &AppState, user: UserRecord) -> AppResult<AuthResponse> {
    let token = state.tokens.issue(&user.id, &claims_for(&user), state.config.auth.token_ttl_secs).await?;
    let csrf_token = if state.config.policy.enforce_csrf {
        Some(state.sessions.issue_csrf(&user.id, state.config.auth.csrf_ttl_secs).await?)
    } else {
        None
    };
    Ok(AuthResponse { success: true, token, csrf_token, user: user.into() })
}

pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> AppResult<impl IntoResponse> {
    let username = req.username.trim().to_string();
    let email = req.email.trim().to_string();
    validation::validate_username(&username)?;
    validation::validate_email(&email)?;
    validation::validate_password(&req.password)?;

    if state.users.find_by_username(&username).await?.is_some() {
        return Err(AppError::Conflict("Username already exists".to_string()));
    }

    let password_hash = hash_password(req.password, state.config.auth.bcrypt_cost).await?;
    let user = UserRecord {
        id: uuid::Uuid::new_v4().to_string(),
        username,
        email,
        password_hash,
        role: DEFAULT_ROLE.to_string(),
        created_at: state.clock.now_secs(),
    };
    // a concurrent registration can still win between the lookup and the insert
    if !state.users.create_user(user.clone()).await? {
        return Err(AppError::Conflict("Username already exists".to_string()));
    }

    state.metrics.inc_registrations();
    tracing::info!(user_id = %user.id, username = %user.username, "user registered");
    let body = sign_in(&state, user).await?;
    Ok((StatusCode::CREATED, Json(body)))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    validation::require_non_empty(&req.username, "username")?;
    validation::require_non_empty(&req.password, "password")?;

    let found = state.users.find_by_username(req.username.trim()).await?;
    let verified = match &found {
        Some(user) => verify_password(req.password, user.password_hash.clone()).await?,
        None => verify_dummy(req.password, state.config.auth.bcrypt_cost).await?,
    };
    let user = match found {
        Some(user) if verified => user,
        _ => {
            state.metrics.inc_failed_logins();
            tracing::warn!(username = %req.username.trim(), "failed login");
            return Err(AppError::unauthorized("Invalid credentials", "Username or password is incorrect"));
        }
    };

    state.metrics.inc_logins();
    tracing::info!(user_id = %user.id, "user logged in");
    Ok(Json(sign_in(&state, user).await?))
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<SuccessResponse>> {
    let user = authenticate(&state, &headers).await?;
    state.tokens.revoke(&user.token).await?;
    state.sessions.drop_csrf(&user.subject).await?;
    tracing::info!(user_id = %user.subject, "user logged out");
    Ok(Json(SuccessResponse { success: true, message: "Logged out".to_string() }))
}

/// Exchanges a live token for a new one; the old token is revoked.
pub async fn refresh(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RefreshRequest>,
) -> AppResult<Json<AuthResponse>> {
    validation::require_non_empty(&req.token, "token")?;
    let claims = state.tokens.verify(&req.token).await?.ok_or_else(AppError::invalid_token)?;
    let user = state.users.find_by_id(&claims.sub).await?.ok_or_else(AppError::invalid_token)?;

    state.tokens.revoke(&req.token).await?;
    tracing::debug!(user_id = %user.id, "token refreshed");
    Ok(Json(sign_in(&state, user).await?))
}

pub async fn verify(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<VerifyResponse>> {
    let token = bearer_token(&headers).ok_or_else(AppError::authentication_required)?;
    let user = match state.tokens.verify(token).await? {
        Some(claims) => state.users.find_by_id(&claims.sub).await?,
        None => None,
    };
    Ok(Json(VerifyResponse { valid: user.is_some(), user: user.map(UserDto::from) }))
}

pub async fn csrf_token(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<CsrfTokenResponse>> {
    let csrf_token = state.sessions.issue_csrf(&user.subject, state.config.auth.csrf_ttl_secs).await?;
    Ok(Json(CsrfTokenResponse { csrf_token }))
}
