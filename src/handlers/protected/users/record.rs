use axum::{
    extract::{Path, State},
    Extension,
};

use crate::app::AppState;
use crate::database::models::User;
use crate::middleware::{ApiResponse, ApiResult};
use crate::types::Actor;

/// GET /users/:id - the user themselves or an admin
pub async fn get(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(user_id): Path<i64>,
) -> ApiResult<User> {
    let user = state.users.get_user(user_id, &actor).await?;
    Ok(ApiResponse::success(user))
}

/// DELETE /users/:id - admin only; cascades to the user's networks
pub async fn delete(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(user_id): Path<i64>,
) -> ApiResult<()> {
    state.users.delete_user(user_id, &actor).await?;
    Ok(ApiResponse::no_content())
}
