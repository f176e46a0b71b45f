use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use super::{
    Admission, AuthStore, CsrfEntry, FormField, FormRecord, FormStats, FormStore, RateLimitStore,
    SessionRecord, StoreError, StoreResult, SubmissionRecord, UserRecord, UserStore,
};

/// sqlx-backed implementation of every storage seam.
///
/// Schema lives in [`crate::db::init_db`].
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn json_object(raw: &str, what: &str) -> StoreResult<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(StoreError::Corrupt(format!("{} is not a JSON object", what))),
        Err(e) => Err(StoreError::Corrupt(format!("{}: {}", what, e))),
    }
}

fn user_from_row(row: &SqliteRow) -> StoreResult<UserRecord> {
    Ok(UserRecord {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role: row.try_get("role")?,
        created_at: row.try_get("created_at")?,
    })
}

fn form_from_row(row: &SqliteRow) -> StoreResult<FormRecord> {
    let fields_raw: String = row.try_get("fields")?;
    let fields: Vec<FormField> = serde_json::from_str(&fields_raw)
        .map_err(|e| StoreError::Corrupt(format!("form fields: {}", e)))?;
    let is_active: i64 = row.try_get("is_active")?;
    Ok(FormRecord {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        fields,
        is_active: is_active != 0,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn submission_from_row(row: &SqliteRow) -> StoreResult<SubmissionRecord> {
    let data_raw: String = row.try_get("data")?;
    Ok(SubmissionRecord {
        id: row.try_get("id")?,
        form_id: row.try_get("form_id")?,
        data: json_object(&data_raw, "submission data")?,
        client_id: row.try_get("client_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn fields_json(fields: &[FormField]) -> StoreResult<String> {
    serde_json::to_string(fields).map_err(|e| StoreError::Corrupt(format!("form fields: {}", e)))
}

#[async_trait]
impl RateLimitStore for SqliteStore {
    async fn hit(&self, key: &str, now: i64, max_requests: usize, window_ms: i64) -> StoreResult<Admission> {
        let cutoff = now - window_ms;
        let max = max_requests as i64;

        sqlx::query("DELETE FROM rate_hits WHERE bucket = ? AND ts <= ?")
            .bind(key)
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        // Count and append in one statement so concurrent callers cannot both
        // take the last slot.
        let inserted = sqlx::query(
            r#"INSERT INTO rate_hits (bucket, ts)
               SELECT ?, ?
               WHERE (SELECT COUNT(*) FROM rate_hits WHERE bucket = ? AND ts > ?) < ?"#,
        )
        .bind(key)
        .bind(now)
        .bind(key)
        .bind(cutoff)
        .bind(max)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 1 {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rate_hits WHERE bucket = ? AND ts > ?")
                .bind(key)
                .bind(cutoff)
                .fetch_one(&self.pool)
                .await?;
            return Ok(Admission::Allowed { remaining: (max - count).max(0) as usize });
        }

        let oldest: Option<i64> = sqlx::query_scalar("SELECT MIN(ts) FROM rate_hits WHERE bucket = ? AND ts > ?")
            .bind(key)
            .bind(cutoff)
            .fetch_one(&self.pool)
            .await?;
        let oldest = oldest.unwrap_or(now);
        Ok(Admission::Rejected { retry_after_ms: (oldest + window_ms - now).max(1) })
    }
}

#[async_trait]
impl AuthStore for SqliteStore {
    async fn put_csrf(&self, subject: &str, entry: CsrfEntry) -> StoreResult<()> {
        sqlx::query(
            r#"INSERT INTO csrf_tokens (subject, token, expires_at) VALUES (?, ?, ?)
               ON CONFLICT(subject) DO UPDATE SET token = excluded.token, expires_at = excluded.expires_at"#,
        )
        .bind(subject)
        .bind(&entry.token)
        .bind(entry.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn check_csrf(&self, subject: &str, candidate: &str, now: i64) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        // Write first so the transaction holds the write lock before reading.
        let evicted = sqlx::query("DELETE FROM csrf_tokens WHERE subject = ? AND expires_at < ?")
            .bind(subject)
            .bind(now)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let stored: Option<String> = if evicted > 0 {
            None
        } else {
            sqlx::query_scalar("SELECT token FROM csrf_tokens WHERE subject = ?")
                .bind(subject)
                .fetch_optional(&mut *tx)
                .await?
        };
        tx.commit().await?;
        Ok(stored.is_some_and(|t| t == candidate))
    }

    async fn drop_csrf(&self, subject: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM csrf_tokens WHERE subject = ?")
            .bind(subject)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn revoke(&self, token: &str, expires_at: i64) -> StoreResult<()> {
        sqlx::query("INSERT INTO revoked_tokens (token, expires_at) VALUES (?, ?) ON CONFLICT(token) DO NOTHING")
            .bind(token)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn is_revoked(&self, token: &str) -> StoreResult<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM revoked_tokens WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    async fn put_session(&self, token: &str, record: SessionRecord) -> StoreResult<()> {
        let claims = Value::Object(record.claims).to_string();
        sqlx::query(
            r#"INSERT INTO sessions (token, subject, claims, issued_at, expires_at) VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(token) DO UPDATE SET subject = excluded.subject, claims = excluded.claims,
                   issued_at = excluded.issued_at, expires_at = excluded.expires_at"#,
        )
        .bind(token)
        .bind(&record.subject)
        .bind(claims)
        .bind(record.issued_at)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_session(&self, token: &str) -> StoreResult<Option<SessionRecord>> {
        let row = sqlx::query("SELECT subject, claims, issued_at, expires_at FROM sessions WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let claims_raw: String = row.try_get("claims")?;
        Ok(Some(SessionRecord {
            subject: row.try_get("subject")?,
            claims: json_object(&claims_raw, "session claims")?,
            issued_at: row.try_get("issued_at")?,
            expires_at: row.try_get("expires_at")?,
        }))
    }

    async fn delete_session(&self, token: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn sweep_expired(&self, now: i64) -> StoreResult<u64> {
        let mut removed = 0;
        removed += sqlx::query("DELETE FROM revoked_tokens WHERE expires_at < ?")
            .bind(now)
            .execute(&self.pool)
            .await?
            .rows_affected();
        removed += sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?
            .rows_affected();
        removed += sqlx::query("DELETE FROM csrf_tokens WHERE expires_at < ?")
            .bind(now)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(removed)
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn create_user(&self, user: UserRecord) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"INSERT INTO users (id, username, email, password_hash, role, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.role)
        .bind(user.created_at)
        .execute(&self.pool)
        .await;
        match result {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<UserRecord>> {
        let row = sqlx::query("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<UserRecord>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }
}

#[async_trait]
impl FormStore for SqliteStore {
    async fn insert_form(&self, form: FormRecord) -> StoreResult<()> {
        sqlx::query(
            r#"INSERT INTO forms (id, owner_id, title, description, fields, is_active, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&form.id)
        .bind(&form.owner_id)
        .bind(&form.title)
        .bind(&form.description)
        .bind(fields_json(&form.fields)?)
        .bind(form.is_active as i64)
        .bind(form.created_at)
        .bind(form.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_form(&self, id: &str) -> StoreResult<Option<FormRecord>> {
        let row = sqlx::query("SELECT * FROM forms WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(form_from_row).transpose()
    }

    async fn list_forms(&self, owner_id: &str) -> StoreResult<Vec<FormRecord>> {
        let rows = sqlx::query("SELECT * FROM forms WHERE owner_id = ? ORDER BY created_at DESC, id ASC")
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(form_from_row).collect()
    }

    async fn update_form(&self, form: FormRecord) -> StoreResult<bool> {
        let affected = sqlx::query(
            r#"UPDATE forms SET title = ?, description = ?, fields = ?, is_active = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(&form.title)
        .bind(&form.description)
        .bind(fields_json(&form.fields)?)
        .bind(form.is_active as i64)
        .bind(form.updated_at)
        .bind(&form.id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected > 0)
    }

    async fn delete_form(&self, id: &str) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM submissions WHERE form_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let affected = sqlx::query("DELETE FROM forms WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(affected > 0)
    }

    async fn insert_submission(&self, submission: SubmissionRecord) -> StoreResult<()> {
        sqlx::query("INSERT INTO submissions (id, form_id, data, client_id, created_at) VALUES (?, ?, ?, ?, ?)")
            .bind(&submission.id)
            .bind(&submission.form_id)
            .bind(Value::Object(submission.data).to_string())
            .bind(&submission.client_id)
            .bind(submission.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_submissions(&self, form_id: &str) -> StoreResult<Vec<SubmissionRecord>> {
        let rows = sqlx::query("SELECT * FROM submissions WHERE form_id = ? ORDER BY created_at DESC, rowid DESC")
            .bind(form_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(submission_from_row).collect()
    }

    async fn stats(&self, owner_id: &str) -> StoreResult<FormStats> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, COALESCE(SUM(is_active), 0) AS active FROM forms WHERE owner_id = ?",
        )
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await?;
        let total: i64 = row.try_get("total")?;
        let active: i64 = row.try_get("active")?;
        let submissions: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM submissions s JOIN forms f ON s.form_id = f.id WHERE f.owner_id = ?",
        )
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(FormStats {
            total_forms: total as u64,
            active_forms: active as u64,
            total_submissions: submissions as u64,
        })
    }
}
