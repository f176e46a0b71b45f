//! Request and response bodies of the JSON API.
//!
//! Field names are camelCase on the wire.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::store::{FormField, FormRecord, FormStats, SubmissionRecord, UserRecord};

fn to_datetime(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

impl From<UserRecord> for UserDto {
    fn from(u: UserRecord) -> Self {
        Self { id: u.id, username: u.username, email: u.email, role: u.role, created_at: to_datetime(u.created_at) }
    }
}

/// Returned by register, login and refresh. Credentials only ever travel in
/// this body, never in headers or cookies.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub success: bool,
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csrf_token: Option<String>,
    pub user: UserDto,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrfTokenResponse {
    pub csrf_token: String,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFormRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub fields: Vec<FormField>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// Partial update; absent fields stay as they are.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFormRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub fields: Option<Vec<FormField>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormDto {
    pub id: String,
    pub title: String,
    pub description: String,
    pub fields: Vec<FormField>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<FormRecord> for FormDto {
    fn from(f: FormRecord) -> Self {
        Self {
            id: f.id,
            title: f.title,
            description: f.description,
            fields: f.fields,
            is_active: f.is_active,
            created_at: to_datetime(f.created_at),
            updated_at: to_datetime(f.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionDto {
    pub id: String,
    pub form_id: String,
    pub data: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl From<SubmissionRecord> for SubmissionDto {
    fn from(s: SubmissionRecord) -> Self {
        Self { id: s.id, form_id: s.form_id, data: s.data, created_at: to_datetime(s.created_at) }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub success: bool,
    pub submission_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub total_forms: u64,
    pub active_forms: u64,
    pub total_submissions: u64,
}

impl From<FormStats> for StatsResponse {
    fn from(s: FormStats) -> Self {
        Self { total_forms: s.total_forms, active_forms: s.active_forms, total_submissions: s.total_submissions }
    }
}
