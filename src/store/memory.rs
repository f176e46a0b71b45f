use std::{
    collections::HashMap,
    sync::Arc,
};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    Admission, AuthStore, CsrfEntry, FormRecord, FormStats, FormStore, RateLimitStore, SessionRecord,
    StoreResult, SubmissionRecord, UserRecord, UserStore,
};

/// Process-local storage for every seam. Clones share the same maps.
///
/// Each map sits behind its own `RwLock`; read-modify-write operations take the
/// write guard for their whole duration, which makes them atomic per key.
#[derive(Clone, Default)]
pub struct MemoryStore {
    windows: Arc<RwLock<HashMap<String, Vec<i64>>>>,
    csrf: Arc<RwLock<HashMap<String, CsrfEntry>>>,
    revoked: Arc<RwLock<HashMap<String, i64>>>,
    sessions: Arc<RwLock<HashMap<String, SessionRecord>>>,
    users: Arc<RwLock<HashMap<String, UserRecord>>>,
    forms: Arc<RwLock<HashMap<String, FormRecord>>>,
    submissions: Arc<RwLock<HashMap<String, Vec<SubmissionRecord>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded hits currently held for `key`.
    pub async fn window_len(&self, key: &str) -> usize {
        self.windows.read().await.get(key).map(Vec::len).unwrap_or(0)
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn hit(&self, key: &str, now: i64, max_requests: usize, window_ms: i64) -> StoreResult<Admission> {
        let mut windows = self.windows.write().await;
        let timestamps = windows.entry(key.to_string()).or_default();

        let cutoff = now - window_ms;
        timestamps.retain(|&t| t > cutoff);

        if timestamps.len() >= max_requests {
            let oldest = timestamps.first().copied().unwrap_or(now);
            let retry_after_ms = (oldest + window_ms - now).max(1);
            return Ok(Admission::Rejected { retry_after_ms });
        }

        timestamps.push(now);
        Ok(Admission::Allowed { remaining: max_requests - timestamps.len() })
    }
}

#[async_trait]
impl AuthStore for MemoryStore {
    async fn put_csrf(&self, subject: &str, entry: CsrfEntry) -> StoreResult<()> {
        self.csrf.write().await.insert(subject.to_string(), entry);
        Ok(())
    }

    async fn check_csrf(&self, subject: &str, candidate: &str, now: i64) -> StoreResult<bool> {
        let mut csrf = self.csrf.write().await;
        let Some(entry) = csrf.get(subject) else {
            return Ok(false);
        };
        if now > entry.expires_at {
            csrf.remove(subject);
            return Ok(false);
        }
        Ok(entry.token == candidate)
    }

    async fn drop_csrf(&self, subject: &str) -> StoreResult<()> {
        self.csrf.write().await.remove(subject);
        Ok(())
    }

    async fn revoke(&self, token: &str, expires_at: i64) -> StoreResult<()> {
        self.revoked.write().await.insert(token.to_string(), expires_at);
        Ok(())
    }

    async fn is_revoked(&self, token: &str) -> StoreResult<bool> {
        Ok(self.revoked.read().await.contains_key(token))
    }

    async fn put_session(&self, token: &str, record: SessionRecord) -> StoreResult<()> {
        self.sessions.write().await.insert(token.to_string(), record);
        Ok(())
    }

    async fn get_session(&self, token: &str) -> StoreResult<Option<SessionRecord>> {
        Ok(self.sessions.read().await.get(token).cloned())
    }

    async fn delete_session(&self, token: &str) -> StoreResult<()> {
        self.sessions.write().await.remove(token);
        Ok(())
    }

    async fn sweep_expired(&self, now: i64) -> StoreResult<u64> {
        let mut removed = 0u64;
        {
            let mut revoked = self.revoked.write().await;
            let before = revoked.len();
            revoked.retain(|_, exp| *exp >= now);
            removed += (before - revoked.len()) as u64;
        }
        {
            let mut sessions = self.sessions.write().await;
            let before = sessions.len();
            sessions.retain(|_, s| s.expires_at > now);
            removed += (before - sessions.len()) as u64;
        }
        {
            let mut csrf = self.csrf.write().await;
            let before = csrf.len();
            csrf.retain(|_, e| e.expires_at >= now);
            removed += (before - csrf.len()) as u64;
        }
        Ok(removed)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, user: UserRecord) -> StoreResult<bool> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.username == user.username) {
            return Ok(false);
        }
        users.insert(user.id.clone(), user);
        Ok(true)
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<UserRecord>> {
        Ok(self.users.read().await.values().find(|u| u.username == username).cloned())
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<UserRecord>> {
        Ok(self.users.read().await.get(id).cloned())
    }
}

#[async_trait]
impl FormStore for MemoryStore {
    async fn insert_form(&self, form: FormRecord) -> StoreResult<()> {
        self.forms.write().await.insert(form.id.clone(), form);
        Ok(())
    }

    async fn get_form(&self, id: &str) -> StoreResult<Option<FormRecord>> {
        Ok(self.forms.read().await.get(id).cloned())
    }

    async fn list_forms(&self, owner_id: &str) -> StoreResult<Vec<FormRecord>> {
        let forms = self.forms.read().await;
        let mut owned: Vec<FormRecord> = forms.values().filter(|f| f.owner_id == owner_id).cloned().collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(owned)
    }

    async fn update_form(&self, form: FormRecord) -> StoreResult<bool> {
        let mut forms = self.forms.write().await;
        match forms.get_mut(&form.id) {
            Some(existing) => {
                *existing = form;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_form(&self, id: &str) -> StoreResult<bool> {
        let removed = self.forms.write().await.remove(id).is_some();
        if removed {
            self.submissions.write().await.remove(id);
        }
        Ok(removed)
    }

    async fn insert_submission(&self, submission: SubmissionRecord) -> StoreResult<()> {
        self.submissions
            .write()
            .await
            .entry(submission.form_id.clone())
            .or_default()
            .push(submission);
        Ok(())
    }

    async fn list_submissions(&self, form_id: &str) -> StoreResult<Vec<SubmissionRecord>> {
        let submissions = self.submissions.read().await;
        let mut list = submissions.get(form_id).cloned().unwrap_or_default();
        list.reverse();
        Ok(list)
    }

    async fn stats(&self, owner_id: &str) -> StoreResult<FormStats> {
        let forms = self.forms.read().await;
        let submissions = self.submissions.read().await;
        let mut stats = FormStats::default();
        for form in forms.values().filter(|f| f.owner_id == owner_id) {
            stats.total_forms += 1;
            if form.is_active {
                stats.active_forms += 1;
            }
            stats.total_submissions += submissions.get(&form.id).map(|s| s.len() as u64).unwrap_or(0);
        }
        Ok(stats)
    }
}
