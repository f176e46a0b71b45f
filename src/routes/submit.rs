use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::{Map, Value};

use crate::error::{AppError, AppResult, OptionExt};
use crate::extract::ApiJson;
use crate::middleware::ClientId;
use crate::state::AppState;
use crate::store::{FormField, SubmissionRecord};
use crate::types::SubmitResponse;

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}

/// Names of required fields that are absent or empty in `data`.
pub fn missing_required<'a>(fields: &'a [FormField], data: &Map<String, Value>) -> Vec<&'a str> {
    fields.iter().filter(|f| f.required && is_blank(data.get(&f.name))).map(|f| f.name.as_str()).collect()
}

/// Public, unauthenticated submission. The per-form budget is spent by the
/// gate before this runs.
pub async fn submit(
    State(state): State<AppState>,
    client: ClientId,
    Path(form_id): Path<String>,
    ApiJson(data): ApiJson<Map<String, Value>>,
) -> AppResult<impl IntoResponse> {
    let form = state.forms.get_form(&form_id).await?.ok_or_not_found("Form")?;
    if !form.is_active {
        return Err(AppError::forbidden("Form is not accepting submissions", "This form has been deactivated"));
    }

    let missing = missing_required(&form.fields, &data);
    if !missing.is_empty() {
        return Err(AppError::Validation(format!("missing required fields: {}", missing.join(", "))));
    }

    let submission = SubmissionRecord {
        id: uuid::Uuid::new_v4().to_string(),
        form_id: form.id,
        data,
        client_id: client.as_str().to_string(),
        created_at: state.clock.now_secs(),
    };
    let submission_id = submission.id.clone();
    state.forms.insert_submission(submission).await?;
    state.metrics.inc_submissions();
    tracing::debug!(%form_id, %submission_id, "submission stored");

    Ok((StatusCode::CREATED, Json(SubmitResponse { success: true, submission_id })))
}
