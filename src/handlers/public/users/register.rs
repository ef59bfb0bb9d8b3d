// handlers/public/users/register.rs - POST /users handler

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};

use crate::app::AppState;
use crate::database::models::User;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::RegisterRequest;

/// POST /users - create an account. Privileged roles need `allow_privileged_signup`.
pub async fn register_post(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<User> {
    let Json(request) = body.map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {}", e.body_text())))?;
    let user = state.users.register(request).await?;
    let location = format!("/users/{}", user.id);
    Ok(ApiResponse::created(user, location))
}
