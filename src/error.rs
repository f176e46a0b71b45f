use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

/// The primary error type for the application.
///
/// Every variant renders as the JSON envelope `{ "error": ..., "message": ... }`.
/// `error` is a stable, machine-readable label; the status code is the
/// authoritative signal for clients.
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or malformed request fields.
    #[error("Validation failed: {0}")]
    Validation(String),
    /// Missing, invalid or expired credentials.
    #[error("{error}: {message}")]
    Unauthorized { error: String, message: String },
    /// Authenticated but not allowed (CSRF failure, inactive resource).
    #[error("{error}: {message}")]
    Forbidden { error: String, message: String },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Rate limited. Retry after {retry_after_seconds} seconds")]
    RateLimited {
        /// The number of seconds to wait before retrying the request.
        retry_after_seconds: u64,
    },
    /// Anything unexpected. The source is logged, never sent to the client.
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn unauthorized(error: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Unauthorized { error: error.into(), message: message.into() }
    }

    pub fn forbidden(error: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Forbidden { error: error.into(), message: message.into() }
    }

    pub fn authentication_required() -> Self {
        Self::unauthorized("Authentication required", "Provide a bearer token in the Authorization header")
    }

    pub fn invalid_token() -> Self {
        Self::unauthorized("Invalid or expired token", "Sign in again to obtain a new token")
    }

    pub fn csrf_failed() -> Self {
        Self::forbidden("CSRF validation failed", "Missing or invalid X-CSRF-Token header")
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            AppError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut retry_after = None;
        let (error, message) = match self {
            AppError::Internal(e) => {
                let error_id = uuid::Uuid::new_v4();
                tracing::error!(%error_id, "Internal error: {:?}", e);
                (
                    "Internal server error".to_string(),
                    format!("An unexpected error occurred (reference {})", error_id),
                )
            }
            AppError::Validation(msg) => ("Validation failed".to_string(), msg),
            AppError::Unauthorized { error, message } => (error, message),
            AppError::Forbidden { error, message } => (error, message),
            AppError::NotFound(msg) => ("Not found".to_string(), msg),
            AppError::Conflict(msg) => ("Conflict".to_string(), msg),
            AppError::RateLimited { retry_after_seconds } => {
                retry_after = Some(retry_after_seconds);
                (
                    "Too many requests".to_string(),
                    format!("Too many requests. Please retry after {} seconds", retry_after_seconds),
                )
            }
        };

        let mut res = (status, Json(json!({ "error": error, "message": message }))).into_response();
        if let Some(secs) = retry_after {
            res.headers_mut().insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        res
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Internal(anyhow::Error::new(err))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::from(StoreError::from(err))
    }
}

/// A type alias for `Result<T, AppError>`, used throughout the application.
pub type AppResult<T> = Result<T, AppError>;

/// An extension trait for `Option` that provides a convenient way to convert
/// an `Option` to a `Result` with a `NotFound` error.
pub trait OptionExt<T> {
    /// Converts an `Option<T>` to a `Result<T, AppError>`.
    fn ok_or_not_found(self, entity: &str) -> AppResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, entity: &str) -> AppResult<T> {
        self.ok_or_else(|| AppError::NotFound(format!("{} not found", entity)))
    }
}

/// Request field validation helpers.
pub mod validation {
    use super::*;

    pub fn require_non_empty(value: &str, field: &str) -> AppResult<()> {
        if value.trim().is_empty() {
            return Err(AppError::Validation(format!("{} is required", field)));
        }
        Ok(())
    }

    /// 3-50 characters from `[A-Za-z0-9_-]`.
    pub fn validate_username(username: &str) -> AppResult<()> {
        require_non_empty(username, "username")?;
        let len = username.chars().count();
        if !(3..=50).contains(&len) {
            return Err(AppError::Validation("username must be between 3 and 50 characters".to_string()));
        }
        if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(AppError::Validation(
                "username may only contain letters, digits, '_' and '-'".to_string(),
            ));
        }
        Ok(())
    }

    /// At least 8 characters with at least one letter and one digit.
    pub fn validate_password(password: &str) -> AppResult<()> {
        require_non_empty(password, "password")?;
        if password.chars().count() < 8 {
            return Err(AppError::Validation("password must be at least 8 characters".to_string()));
        }
        let has_letter = password.chars().any(|c| c.is_alphabetic());
        let has_digit = password.chars().any(|c| c.is_ascii_digit());
        if !has_letter || !has_digit {
            return Err(AppError::Validation(
                "password must contain at least one letter and one digit".to_string(),
            ));
        }
        if password.len() > 72 {
            // bcrypt only looks at the first 72 bytes
            return Err(AppError::Validation("password must be at most 72 bytes".to_string()));
        }
        Ok(())
    }

    pub fn validate_email(email: &str) -> AppResult<()> {
        require_non_empty(email, "email")?;
        let valid = match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.contains('@')
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
            }
            None => false,
        };
        if !valid || email.chars().any(char::is_whitespace) {
            return Err(AppError::Validation("email address is not valid".to_string()));
        }
        Ok(())
    }
}
