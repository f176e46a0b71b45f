use axum::{extract::State, Extension, Json};

use crate::error::AppResult;
use crate::middleware::AuthUser;
use crate::state::AppState;
use crate::types::StatsResponse;

pub async fn stats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<StatsResponse>> {
    Ok(Json(state.forms.stats(&user.subject).await?.into()))
}
