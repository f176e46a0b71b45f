//! The per-request admission pipeline.
//!
//! Evaluated in order, stopping at the first terminal outcome:
//!
//! 1. `OPTIONS` preflight answers `204` straight away.
//! 2. The health route goes through untouched.
//! 3. The global per-client budget.
//! 4. Route class: public submission (per-form budget), auth endpoints
//!    (auth budget on register/login), or protected `/api/*` (bearer token,
//!    then CSRF on state-changing methods).
//! 5. Anything else falls through to the router (and its 404 fallback).
//!
//! Headers are added by the outer security layer, not here.

use axum::{
    extract::{Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::auth::authenticate;
use super::csrf::{enforce_csrf, requires_csrf};
use super::ip::ClientId;
use super::rate_limit::{auth_key, submission_key};
use crate::config::RateLimit;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub const HEALTH_PATH: &str = "/api/health";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass<'a> {
    Preflight,
    Health,
    /// `/api/submit/:formId`
    Submission { form_id: &'a str },
    /// `/api/auth/*`; `limited` for register and login.
    Auth { limited: bool },
    /// Every other `/api/*` path, including `/api/csrf-token`.
    Protected,
    /// Outside `/api`; left to the router.
    Other,
}

pub fn classify<'a>(method: &Method, path: &'a str) -> RouteClass<'a> {
    if *method == Method::OPTIONS {
        return RouteClass::Preflight;
    }
    if path == HEALTH_PATH {
        return RouteClass::Health;
    }
    if let Some(rest) = path.strip_prefix("/api/submit/") {
        if !rest.is_empty() && !rest.contains('/') {
            return RouteClass::Submission { form_id: rest };
        }
    }
    if let Some(action) = path.strip_prefix("/api/auth/") {
        return RouteClass::Auth { limited: matches!(action, "register" | "login") };
    }
    if path == "/api" || path.starts_with("/api/") {
        return RouteClass::Protected;
    }
    RouteClass::Other
}

/// Axum middleware running the pipeline described in the module docs.
pub async fn gate_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    match admit(&state, req, next).await {
        Ok(res) => res,
        Err(err) => {
            match &err {
                AppError::RateLimited { .. } => state.metrics.inc_rate_limited(),
                AppError::Unauthorized { .. } => state.metrics.inc_unauthorized(),
                _ => {}
            }
            err.into_response()
        }
    }
}

async fn admit(state: &AppState, req: Request, next: Next) -> AppResult<Response> {
    let path = req.uri().path().to_string();
    let class = classify(req.method(), &path);

    match class {
        RouteClass::Preflight => return Ok(StatusCode::NO_CONTENT.into_response()),
        RouteClass::Health => return Ok(next.run(req).await),
        _ => {}
    }

    state.metrics.inc_requests();
    let (mut parts, body) = req.into_parts();
    let client = ClientId::from_parts(&parts);
    let limits = &state.config.policy.rate_limits;

    limit(state, client.as_str(), limits.global).await?;

    match class {
        RouteClass::Submission { form_id } => {
            limit(state, &submission_key(form_id, client.as_str()), limits.submission).await?;
        }
        RouteClass::Auth { limited: true } => {
            limit(state, &auth_key(client.as_str()), limits.auth).await?;
        }
        RouteClass::Protected => {
            let user = authenticate(state, &parts.headers).await?;
            if state.config.policy.enforce_csrf && requires_csrf(&parts.method) {
                enforce_csrf(state, &user.subject, &parts.headers).await?;
            }
            tracing::debug!(subject = %user.subject, %path, "authenticated request");
            parts.extensions.insert(user);
        }
        _ => {}
    }

    Ok(next.run(Request::from_parts(parts, body)).await)
}

async fn limit(state: &AppState, key: &str, budget: RateLimit) -> AppResult<()> {
    state.rate_limiter.check(key, budget).await
}
