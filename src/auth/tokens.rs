use std::sync::Arc;

use serde_json::{Map, Value};

use super::{codec::TokenClaims, random_hex, SessionStore, TokenCodec};
use crate::clock::Clock;
use crate::config::TokenScheme;
use crate::store::{SessionRecord, StoreResult};

/// Issues, verifies and revokes bearer tokens under the configured scheme.
///
/// Verification always consults the revocation set, whichever scheme minted
/// the token.
#[derive(Clone)]
pub struct TokenService {
    scheme: TokenScheme,
    codec: Option<TokenCodec>,
    sessions: SessionStore,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    pub fn signed(codec: TokenCodec, sessions: SessionStore, clock: Arc<dyn Clock>) -> Self {
        Self { scheme: TokenScheme::Signed, codec: Some(codec), sessions, clock }
    }

    pub fn opaque(sessions: SessionStore, clock: Arc<dyn Clock>) -> Self {
        Self { scheme: TokenScheme::Opaque, codec: None, sessions, clock }
    }

    pub fn scheme(&self) -> TokenScheme {
        self.scheme
    }

    #[tracing::instrument(skip(self, claims), fields(scheme = ?self.scheme))]
    pub async fn issue(&self, subject: &str, claims: &Map<String, Value>, ttl_secs: i64) -> StoreResult<String> {
        match &self.codec {
            Some(codec) => Ok(codec.issue(subject, claims, ttl_secs)),
            None => {
                let token = random_hex(32);
                let now = self.clock.now_secs();
                let record = SessionRecord {
                    subject: subject.to_string(),
                    claims: claims.clone(),
                    issued_at: now,
                    expires_at: now + ttl_secs,
                };
                self.sessions.backend().put_session(&token, record).await?;
                Ok(token)
            }
        }
    }

    /// `Ok(None)` for anything that is not a live, unrevoked token.
    pub async fn verify(&self, token: &str) -> StoreResult<Option<TokenClaims>> {
        if token.is_empty() || self.sessions.is_revoked(token).await? {
            return Ok(None);
        }
        match &self.codec {
            Some(codec) => Ok(codec.verify(token)),
            None => {
                let Some(record) = self.sessions.backend().get_session(token).await? else {
                    return Ok(None);
                };
                if record.expires_at <= self.clock.now_secs() {
                    self.sessions.backend().delete_session(token).await?;
                    return Ok(None);
                }
                Ok(Some(TokenClaims {
                    sub: record.subject,
                    iat: record.issued_at,
                    exp: Some(record.expires_at),
                    extra: record.claims,
                }))
            }
        }
    }

    /// Adds `token` to the revocation set. Idempotent.
    pub async fn revoke(&self, token: &str) -> StoreResult<()> {
        let expires_at = match &self.codec {
            Some(codec) => codec.verify(token).and_then(|c| c.exp),
            None => {
                let record = self.sessions.backend().get_session(token).await?;
                self.sessions.backend().delete_session(token).await?;
                record.map(|r| r.expires_at)
            }
        };
        // Unverifiable tokens are recorded with `now` and leave on the next sweep.
        let expires_at = expires_at.unwrap_or_else(|| self.clock.now_secs());
        self.sessions.revoke_token(token, expires_at).await
    }
}
