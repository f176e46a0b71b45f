use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};

use crate::error::{validation, AppError, AppResult, OptionExt};
use crate::extract::ApiJson;
use crate::middleware::AuthUser;
use crate::state::AppState;
use crate::store::{FormField, FormRecord};
use crate::types::{CreateFormRequest, FormDto, SubmissionDto, SuccessResponse, UpdateFormRequest};

fn validate_fields(fields: &[FormField]) -> AppResult<()> {
    let mut seen = std::collections::HashSet::new();
    for field in fields {
        validation::require_non_empty(&field.name, "field name")?;
        if !seen.insert(field.name.as_str()) {
            return Err(AppError::Validation(format!("duplicate field name '{}'", field.name)));
        }
    }
    Ok(())
}

/// Loads a form the caller owns. Someone else's form is reported as missing.
async fn owned_form(state: &AppState, user: &AuthUser, id: &str) -> AppResult<FormRecord> {
    state.forms.get_form(id).await?.filter(|f| f.owner_id == user.subject).ok_or_not_found("Form")
}

pub async fn list_forms(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<Vec<FormDto>>> {
    let forms = state.forms.list_forms(&user.subject).await?;
    Ok(Json(forms.into_iter().map(FormDto::from).collect()))
}

pub async fn create_form(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(req): ApiJson<CreateFormRequest>,
) -> AppResult<impl IntoResponse> {
    validation::require_non_empty(&req.title, "title")?;
    validate_fields(&req.fields)?;

    let now = state.clock.now_secs();
    let form = FormRecord {
        id: uuid::Uuid::new_v4().to_string(),
        owner_id: user.subject.clone(),
        title: req.title.trim().to_string(),
        description: req.description,
        fields: req.fields,
        is_active: req.is_active,
        created_at: now,
        updated_at: now,
    };
    state.forms.insert_form(form.clone()).await?;
    tracing::info!(form_id = %form.id, owner = %user.subject, "form created");
    Ok((StatusCode::CREATED, Json(FormDto::from(form))))
}

pub async fn get_form(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<Json<FormDto>> {
    Ok(Json(owned_form(&state, &user, &id).await?.into()))
}

pub async fn update_form(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateFormRequest>,
) -> AppResult<Json<FormDto>> {
    let mut form = owned_form(&state, &user, &id).await?;
    if let Some(title) = req.title {
        validation::require_non_empty(&title, "title")?;
        form.title = title.trim().to_string();
    }
    if let Some(description) = req.description {
        form.description = description;
    }
    if let Some(fields) = req.fields {
        validate_fields(&fields)?;
        form.fields = fields;
    }
    if let Some(is_active) = req.is_active {
        form.is_active = is_active;
    }
    form.updated_at = state.clock.now_secs();

    if !state.forms.update_form(form.clone()).await? {
        return Err(AppError::NotFound("Form not found".to_string()));
    }
    Ok(Json(form.into()))
}

pub async fn delete_form(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<Json<SuccessResponse>> {
    let form = owned_form(&state, &user, &id).await?;
    if !state.forms.delete_form(&form.id).await? {
        return Err(AppError::NotFound("Form not found".to_string()));
    }
    tracing::info!(form_id = %form.id, owner = %user.subject, "form deleted");
    Ok(Json(SuccessResponse { success: true, message: "Form deleted".to_string() }))
}

pub async fn list_submissions(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<SubmissionDto>>> {
    let form = owned_form(&state, &user, &id).await?;
    let submissions = state.forms.list_submissions(&form.id).await?;
    Ok(Json(submissions.into_iter().map(SubmissionDto::from).collect()))
}
