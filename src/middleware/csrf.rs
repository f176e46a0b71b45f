//! Cross-Site Request Forgery (CSRF) checks.
//!
//! Each authenticated subject holds at most one live CSRF token (see
//! [`crate::auth::SessionStore`]). State-changing protected requests must echo
//! it in the `X-CSRF-Token` header.

use axum::http::{HeaderMap, Method};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub const CSRF_HEADER: &str = "X-CSRF-Token";

/// Methods that modify state and therefore need a CSRF token.
pub fn requires_csrf(method: &Method) -> bool {
    matches!(method, &Method::POST | &Method::PUT | &Method::DELETE | &Method::PATCH)
}

/// The submitted CSRF token, if the header is present and readable.
pub fn csrf_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(CSRF_HEADER).and_then(|v| v.to_str().ok()).map(str::trim)
}

/// Fails with `403 CSRF validation failed` unless `headers` carry the
/// subject's current CSRF token.
pub async fn enforce_csrf(state: &AppState, subject: &str, headers: &HeaderMap) -> AppResult<()> {
    let candidate = csrf_header(headers).unwrap_or_default();
    if state.sessions.validate_csrf(subject, candidate).await? {
        return Ok(());
    }
    state.metrics.inc_csrf_rejected();
    tracing::warn!(%subject, header_present = !candidate.is_empty(), "CSRF validation failed");
    Err(AppError::csrf_failed())
}
