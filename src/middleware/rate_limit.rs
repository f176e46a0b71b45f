use std::sync::Arc;

use crate::clock::Clock;
use crate::config::RateLimit;
use crate::error::{AppError, AppResult};
use crate::store::{Admission, RateLimitStore, StoreResult};

/// A thread-safe rate limiter based on the sliding window algorithm.
///
/// The limiter is identifier-agnostic: callers choose the key (`203.0.113.7`,
/// `auth:203.0.113.7`, `form:<id>:203.0.113.7`) and the budget.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Records a request for `key` if the window has room.
    ///
    /// Rejected requests are not recorded, so a client hammering a closed
    /// window does not extend its own ban.
    pub async fn allow(&self, key: &str, limit: RateLimit) -> StoreResult<Admission> {
        let now = self.clock.now_millis();
        self.store.hit(key, now, limit.max_requests, limit.window_ms).await
    }

    /// Like [`RateLimiter::allow`], but maps a rejection to `429`.
    pub async fn check(&self, key: &str, limit: RateLimit) -> AppResult<()> {
        match self.allow(key, limit).await? {
            Admission::Allowed { .. } => Ok(()),
            Admission::Rejected { retry_after_ms } => {
                tracing::debug!(%key, retry_after_ms, "rate limit exceeded");
                let retry_after_seconds = ((retry_after_ms + 999) / 1000).max(1) as u64;
                Err(AppError::RateLimited { retry_after_seconds })
            }
        }
    }
}

pub fn auth_key(client_id: &str) -> String {
    format!("auth:{}", client_id)
}

pub fn submission_key(form_id: &str, client_id: &str) -> String {
    format!("form:{}:{}", form_id, client_id)
}
