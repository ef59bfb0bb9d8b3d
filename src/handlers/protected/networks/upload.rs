use axum::{
    extract::{Multipart, Path, State},
    Extension,
};
use serde::Serialize;

use super::utils::read_upload;
use crate::app::AppState;
use crate::database::models::Network;
use crate::middleware::{ApiResponse, ApiResult};
use crate::network::ReplaceOutcome;
use crate::types::Actor;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub network_id: i64,
    #[serde(flatten)]
    pub network: Network,
}

/// POST /networks/upload - create a network from a GeoJSON FeatureCollection
pub async fn post(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    multipart: Multipart,
) -> ApiResult<UploadResponse> {
    let raw = read_upload(multipart).await?;
    let network = state.networks.upload(&raw, &actor).await?;
    let location = format!("/networks/{}/edges", network.id);
    Ok(ApiResponse::created(
        UploadResponse {
            network_id: network.id,
            network,
        },
        location,
    ))
}

/// POST /networks/:id/update - replace the current edges with the uploaded features
pub async fn update(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(network_id): Path<i64>,
    multipart: Multipart,
) -> ApiResult<ReplaceOutcome> {
    let raw = read_upload(multipart).await?;
    let outcome = state.networks.update(network_id, &raw, &actor).await?;
    Ok(ApiResponse::success(outcome))
}
