use axum::{extract::State, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{middleware::AuthUser, AppState};

/// GET /users/me
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let profile = state
        .auth_service
        .get_user_profile(claims.user_id, claims.user_id)
        .await?;
    Ok(Json(profile))
}
