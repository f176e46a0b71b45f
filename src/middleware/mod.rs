//! Middleware components for HTTP request processing.
//!
//! [`gate`] is the admission pipeline (rate limits, bearer tokens, CSRF);
//! [`security_headers`] wraps everything and stamps the response headers.
//! The remaining modules are the building blocks the gate and handlers share.

pub mod auth;
pub mod csrf;
pub mod gate;
pub mod ip;
pub mod rate_limit;
pub mod security_headers;

pub use auth::AuthUser;
pub use ip::ClientId;
pub use rate_limit::RateLimiter;
