//! # formgate
//!
//! The request-admission layer of a form-collection web service: per-client
//! sliding-window rate limiting, bearer-token authentication (HMAC-signed or
//! opaque), per-subject CSRF tokens with expiry, a token revocation set, and
//! uniform security headers, in front of a small forms API.
//!
//! ## Architecture
//!
//! The application is built using:
//! - **Axum**: HTTP server, routing and middleware
//! - **SQLx**: SQLite storage backend
//! - **Tokio**: Async runtime
//! - **Serde**: JSON request and response bodies
//!
//! ## Core Components
//!
//! - [`auth`]: Token codec, token service, CSRF slots, password hashing
//! - [`clock`]: Injectable time source
//! - [`config`]: Layered configuration and the security policy
//! - [`db`]: SQLite connection and schema initialization
//! - [`error`]: Centralized error handling and the JSON error envelope
//! - [`metrics`]: Gate and auth counters
//! - [`middleware`]: Admission gate, security headers, client identification
//! - [`routes`]: HTTP API endpoint handlers
//! - [`state`]: Shared application state
//! - [`store`]: Storage traits with in-memory and SQLite implementations
//! - [`types`]: Request and response bodies

pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod store;
pub mod types;

#[cfg(test)]
mod tests;

use std::any::Any;

use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use crate::error::AppError;
use crate::middleware::{gate::gate_middleware, security_headers::security_headers_middleware};
use crate::state::AppState;

/// Request bodies above this size are rejected before any handler runs.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Builds the full application: routes, the admission gate, panic recovery,
/// tracing and the security header layer (outermost, so every response
/// carries the headers, including gate rejections and 404s).
pub fn build_router(state: AppState) -> Router {
    with_layers(api_routes(), state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/api/health", get(routes::health::health))
        .route("/metrics", get(routes::health::metrics))
        .route("/api/auth/register", post(routes::auth::register))
        .route("/api/auth/login", post(routes::auth::login))
        .route("/api/auth/logout", post(routes::auth::logout))
        .route("/api/auth/refresh", post(routes::auth::refresh))
        .route("/api/auth/verify", get(routes::auth::verify))
        .route("/api/csrf-token", get(routes::auth::csrf_token))
        .route("/api/submit/{form_id}", post(routes::submit::submit))
        .route("/api/forms", get(routes::forms::list_forms).post(routes::forms::create_form))
        .route(
            "/api/forms/{id}",
            get(routes::forms::get_form).put(routes::forms::update_form).delete(routes::forms::delete_form),
        )
        .route("/api/forms/{id}/submissions", get(routes::forms::list_submissions))
        .route("/api/dashboard/stats", get(routes::dashboard::stats))
        .fallback(routes::health::not_found)
}

/// Wraps `routes` in the admission gate and the outer layers shared by every
/// response.
pub(crate) fn with_layers(routes: Router<AppState>, state: AppState) -> Router {
    let cfg = state.config.clone();

    routes
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(from_fn_with_state(state.clone(), gate_middleware))
        .with_state(state)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(from_fn_with_state(cfg, security_headers_middleware))
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    AppError::Internal(anyhow::anyhow!("handler panicked: {}", detail)).into_response()
}
