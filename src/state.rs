use std::sync::Arc;

use sqlx::SqlitePool;

use crate::auth::{SessionStore, TokenCodec, TokenService};
use crate::clock::{Clock, SystemClock};
use crate::config::{AppConfig, TokenScheme};
use crate::metrics::Metrics;
use crate::middleware::RateLimiter;
use crate::store::{AuthStore, FormStore, MemoryStore, RateLimitStore, SqliteStore, UserStore};

/// The storage implementations behind each seam.
#[derive(Clone)]
pub struct Backends {
    pub auth: Arc<dyn AuthStore>,
    pub rate: Arc<dyn RateLimitStore>,
    pub users: Arc<dyn UserStore>,
    pub forms: Arc<dyn FormStore>,
}

impl Backends {
    /// Everything in process memory; lost on restart.
    pub fn in_memory() -> Self {
        let store = MemoryStore::new();
        Self {
            auth: Arc::new(store.clone()),
            rate: Arc::new(store.clone()),
            users: Arc::new(store.clone()),
            forms: Arc::new(store),
        }
    }

    /// Everything in the given SQLite database. The schema must exist.
    pub fn sqlite(pool: SqlitePool) -> Self {
        let store = SqliteStore::new(pool);
        Self {
            auth: Arc::new(store.clone()),
            rate: Arc::new(store.clone()),
            users: Arc::new(store.clone()),
            forms: Arc::new(store),
        }
    }
}

/// The shared application state.
///
/// Cheap to clone; every field is either `Arc`-backed or a handle around one.
#[derive(Clone)]
pub struct AppState {
    /// The application configuration.
    pub config: Arc<AppConfig>,
    /// Source of "now" for every expiry and window check.
    pub clock: Arc<dyn Clock>,
    /// Bearer token issuance and verification under the configured scheme.
    pub tokens: TokenService,
    /// CSRF slots and the revocation set.
    pub sessions: SessionStore,
    /// Sliding-window limiter shared by the global, auth and submission budgets.
    pub rate_limiter: RateLimiter,
    /// Credential store.
    pub users: Arc<dyn UserStore>,
    /// Forms and submissions.
    pub forms: Arc<dyn FormStore>,
    /// Gate and auth counters.
    pub metrics: Metrics,
}

impl AppState {
    /// Creates a new `AppState` on the wall clock.
    ///
    /// Fails when the signed scheme is selected without a usable secret.
    pub fn new(config: AppConfig, backends: Backends) -> anyhow::Result<Self> {
        Self::with_clock(config, backends, Arc::new(SystemClock))
    }

    pub fn with_clock(config: AppConfig, backends: Backends, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let sessions = SessionStore::new(backends.auth.clone(), clock.clone());
        let tokens = match config.policy.token_scheme {
            TokenScheme::Signed => {
                let codec = TokenCodec::new(config.auth.token_secret.as_bytes(), clock.clone())?;
                TokenService::signed(codec, sessions.clone(), clock.clone())
            }
            TokenScheme::Opaque => TokenService::opaque(sessions.clone(), clock.clone()),
        };

        Ok(Self {
            rate_limiter: RateLimiter::new(backends.rate, clock.clone()),
            users: backends.users,
            forms: backends.forms,
            config: Arc::new(config),
            clock,
            tokens,
            sessions,
            metrics: Metrics::new(),
        })
    }
}
