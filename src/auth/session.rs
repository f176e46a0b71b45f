use std::sync::Arc;

use super::random_hex;
use crate::clock::Clock;
use crate::store::{AuthStore, CsrfEntry, StoreResult};

/// Bytes of entropy in a CSRF token (hex-encoded on the wire).
pub const CSRF_TOKEN_BYTES: usize = 32;

/// Per-subject CSRF slots and the revocation set.
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn AuthStore>,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(store: Arc<dyn AuthStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub(crate) fn backend(&self) -> &Arc<dyn AuthStore> {
        &self.store
    }

    /// Mints a fresh CSRF token for `subject`; any previous token stops working.
    pub async fn issue_csrf(&self, subject: &str, ttl_secs: i64) -> StoreResult<String> {
        let token = random_hex(CSRF_TOKEN_BYTES);
        let expires_at = self.clock.now_secs() + ttl_secs;
        self.store.put_csrf(subject, CsrfEntry { token: token.clone(), expires_at }).await?;
        Ok(token)
    }

    pub async fn validate_csrf(&self, subject: &str, candidate: &str) -> StoreResult<bool> {
        if candidate.is_empty() {
            return Ok(false);
        }
        self.store.check_csrf(subject, candidate, self.clock.now_secs()).await
    }

    pub async fn drop_csrf(&self, subject: &str) -> StoreResult<()> {
        self.store.drop_csrf(subject).await
    }

    /// Revokes `token`, remembering it until `expires_at`.
    pub async fn revoke_token(&self, token: &str, expires_at: i64) -> StoreResult<()> {
        self.store.revoke(token, expires_at).await
    }

    pub async fn is_revoked(&self, token: &str) -> StoreResult<bool> {
        self.store.is_revoked(token).await
    }

    /// Removes expired revocations, sessions and CSRF slots.
    pub async fn sweep(&self) -> StoreResult<u64> {
        self.store.sweep_expired(self.clock.now_secs()).await
    }
}
