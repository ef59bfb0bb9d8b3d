use axum::{
    extract::{Path, State},
    Extension,
};

use crate::app::AppState;
use crate::database::models::Network;
use crate::middleware::{ApiResponse, ApiResult};
use crate::types::Actor;

/// GET /users/:id/networks - networks owned by a user
pub async fn get(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(user_id): Path<i64>,
) -> ApiResult<Vec<Network>> {
    let networks = state.networks.list_for_user(user_id, &actor).await?;
    Ok(ApiResponse::success(networks))
}
