use axum::{
    extract::{Path, Query, State},
    Extension,
};
use serde::Deserialize;

use crate::app::AppState;
use crate::database::models::Generation;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::network::ingest::parse_timestamp;
use crate::network::FeatureCollection;
use crate::types::Actor;

#[derive(Debug, Deserialize)]
pub struct EdgesQuery {
    /// Point in time to reconstruct; current edges when absent
    pub timestamp: Option<String>,
}

/// GET /networks/:id/edges[?timestamp=] - edges as a FeatureCollection
pub async fn get(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(network_id): Path<i64>,
    Query(query): Query<EdgesQuery>,
) -> ApiResult<FeatureCollection> {
    let at_time = match query.timestamp.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        Some(text) => Some(
            parse_timestamp(text)
                .ok_or_else(|| ApiError::bad_request(format!("Invalid timestamp '{}'", text)))?,
        ),
        None => None,
    };

    let collection = state.networks.edges(network_id, &actor, at_time).await?;
    Ok(ApiResponse::success(collection))
}

/// GET /networks/:id/generations - version history, oldest first
pub async fn generations(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(network_id): Path<i64>,
) -> ApiResult<Vec<Generation>> {
    let generations = state.networks.generations(network_id, &actor).await?;
    Ok(ApiResponse::success(generations))
}
