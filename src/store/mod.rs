//! Storage seams.
//!
//! The gate and the handlers only talk to these traits. [`memory::MemoryStore`]
//! keeps everything in process-wide maps, [`sqlite::SqliteStore`] persists the
//! same records through sqlx. Every per-key read-modify-write is exposed as a
//! single trait method so implementations can make it atomic.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of recording a hit against a sliding window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed { remaining: usize },
    Rejected { retry_after_ms: i64 },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed { .. })
    }
}

/// Server-side record behind an opaque bearer token.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub subject: String,
    pub claims: Map<String, Value>,
    pub issued_at: i64,
    pub expires_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfEntry {
    pub token: String,
    pub expires_at: i64,
}

/// CSRF slots, revoked tokens and opaque sessions. Timestamps are seconds.
#[async_trait]
pub trait AuthStore: Send + Sync {
    /// Stores `entry` for `subject`, replacing any previous one.
    async fn put_csrf(&self, subject: &str, entry: CsrfEntry) -> StoreResult<()>;

    /// Checks `candidate` against the subject's slot in one step. An expired
    /// slot (`now > expires_at`) is evicted and the check fails.
    async fn check_csrf(&self, subject: &str, candidate: &str, now: i64) -> StoreResult<bool>;

    async fn drop_csrf(&self, subject: &str) -> StoreResult<()>;

    /// Idempotent. `expires_at` is the token's own expiry, kept so the entry
    /// can be swept once it no longer matters.
    async fn revoke(&self, token: &str, expires_at: i64) -> StoreResult<()>;

    async fn is_revoked(&self, token: &str) -> StoreResult<bool>;

    async fn put_session(&self, token: &str, record: SessionRecord) -> StoreResult<()>;

    async fn get_session(&self, token: &str) -> StoreResult<Option<SessionRecord>>;

    async fn delete_session(&self, token: &str) -> StoreResult<()>;

    /// Drops revocations, sessions and CSRF slots that expired before `now`.
    /// Returns the number of removed records.
    async fn sweep_expired(&self, now: i64) -> StoreResult<u64>;
}

/// Sliding-window counters keyed by arbitrary strings. Timestamps are milliseconds.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Prunes hits at or before `now - window_ms`, then either rejects (when
    /// `max_requests` hits remain) or records `now`. Atomic per key.
    async fn hit(&self, key: &str, now: i64, max_requests: usize, window_ms: i64) -> StoreResult<Admission>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: i64,
}

/// Credential store. Username uniqueness is enforced by `create_user`.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Returns `Ok(false)` when the username is already taken.
    async fn create_user(&self, user: UserRecord) -> StoreResult<bool>;

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<UserRecord>>;

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<UserRecord>>;
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FormField {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type", default = "default_field_type")]
    pub kind: String,
    #[serde(default)]
    pub required: bool,
}

fn default_field_type() -> String {
    "text".to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormRecord {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub description: String,
    pub fields: Vec<FormField>,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionRecord {
    pub id: String,
    pub form_id: String,
    pub data: Map<String, Value>,
    pub client_id: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormStats {
    pub total_forms: u64,
    pub active_forms: u64,
    pub total_submissions: u64,
}

/// Forms and their submissions.
#[async_trait]
pub trait FormStore: Send + Sync {
    async fn insert_form(&self, form: FormRecord) -> StoreResult<()>;

    async fn get_form(&self, id: &str) -> StoreResult<Option<FormRecord>>;

    async fn list_forms(&self, owner_id: &str) -> StoreResult<Vec<FormRecord>>;

    /// Returns `Ok(false)` when no such form exists.
    async fn update_form(&self, form: FormRecord) -> StoreResult<bool>;

    /// Removes the form and its submissions. Returns `Ok(false)` when absent.
    async fn delete_form(&self, id: &str) -> StoreResult<bool>;

    async fn insert_submission(&self, submission: SubmissionRecord) -> StoreResult<()>;

    /// Newest first.
    async fn list_submissions(&self, form_id: &str) -> StoreResult<Vec<SubmissionRecord>>;

    async fn stats(&self, owner_id: &str) -> StoreResult<FormStats>;
}
