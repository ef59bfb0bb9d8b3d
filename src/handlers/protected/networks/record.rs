use axum::{
    extract::{Path, State},
    Extension,
};

use crate::app::AppState;
use crate::middleware::{ApiResponse, ApiResult};
use crate::types::Actor;

/// DELETE /networks/:id - remove a network with its whole history
pub async fn delete(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(network_id): Path<i64>,
) -> ApiResult<()> {
    state.networks.delete(network_id, &actor).await?;
    Ok(ApiResponse::no_content())
}
