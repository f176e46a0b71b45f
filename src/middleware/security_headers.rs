//! Security and CORS headers for HTTP responses.
//!
//! The layer built from [`security_headers_middleware`] sits outermost in the
//! router, so every response (handler output, gate rejections, preflights,
//! 404s and caught panics) leaves with the same header set.

use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_MAX_AGE, CACHE_CONTROL, CONTENT_SECURITY_POLICY, CONTENT_TYPE, PRAGMA,
    REFERRER_POLICY, STRICT_TRANSPORT_SECURITY, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS, X_XSS_PROTECTION,
};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::config::AppConfig;

const DEFAULT_CSP: &str = "default-src 'self'; frame-ancestors 'none'";
const ALLOWED_METHODS: &str = "GET, POST, PUT, PATCH, DELETE, OPTIONS";
const ALLOWED_HEADERS: &str = "Content-Type, Authorization, X-CSRF-Token";

/// Adds the security and CORS header set to every response.
///
/// # Security Headers Applied
///
/// - `X-Content-Type-Options: nosniff`
/// - `X-Frame-Options: DENY`
/// - `X-XSS-Protection: 1; mode=block`
/// - `Referrer-Policy: strict-origin-when-cross-origin`
/// - `Permissions-Policy: geolocation=(), microphone=(), camera=()`
/// - `Content-Security-Policy` from configuration (a strict default otherwise)
/// - `Strict-Transport-Security` from configuration
/// - `Access-Control-Allow-Origin/Methods/Headers/Max-Age`
///
/// Values already set by a handler are overwritten.
pub async fn security_headers_middleware(
    State(cfg): State<Arc<AppConfig>>,
    req: Request,
    next: Next,
) -> Response {
    let mut res = next.run(req).await;
    apply_headers(&cfg, res.headers_mut());
    res
}

pub fn apply_headers(cfg: &AppConfig, headers: &mut HeaderMap) {
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block"));
    headers.insert(REFERRER_POLICY, HeaderValue::from_static("strict-origin-when-cross-origin"));
    headers.insert(
        HeaderName::from_static("permissions-policy"),
        HeaderValue::from_static("geolocation=(), microphone=(), camera=()"),
    );

    let sec = cfg.security.clone().unwrap_or_default();
    let csp = sec
        .csp
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .and_then(|c| HeaderValue::from_str(c).ok())
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CSP));
    headers.insert(CONTENT_SECURITY_POLICY, csp);

    let max_age = sec.hsts_max_age.unwrap_or(31536000); // 1 year
    let include_sub = if sec.hsts_include_subdomains.unwrap_or(false) { "; includeSubDomains" } else { "" };
    headers.insert(
        STRICT_TRANSPORT_SECURITY,
        HeaderValue::from_str(&format!("max-age={}{}", max_age, include_sub))
            .unwrap_or(HeaderValue::from_static("max-age=31536000")),
    );

    // CORS
    let origin = HeaderValue::from_str(&cfg.cors.allow_origin).unwrap_or(HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOWED_METHODS));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(ALLOWED_HEADERS));
    headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from(cfg.cors.max_age_secs));

    // API responses carry credentials and per-user data
    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|ct| ct.to_str().ok())
        .is_some_and(|s| s.starts_with("application/json"));
    if is_json {
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    }
}
