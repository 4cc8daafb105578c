use axum::{
    extract::{rejection::PathRejection, Path, State},
    Json,
};
use quickpark::domain::parking::SpotId;

use crate::{
    error::ApiResult,
    extractor::AuthorizedCaller,
    model::spot::{SpotListResponse, SpotResponse, SpotView},
    AppState,
};

pub async fn list_spots(
    State(state): State<AppState>,
    _caller: AuthorizedCaller,
) -> ApiResult<Json<SpotListResponse>> {
    let spots = state.service.list_spots().await?;
    Ok(Json(SpotListResponse::from(spots)))
}

pub async fn get_spot(
    State(state): State<AppState>,
    _caller: AuthorizedCaller,
    id: Result<Path<SpotId>, PathRejection>,
) -> ApiResult<Json<SpotResponse>> {
    let Path(id) = id?;
    let spot = state.service.get_spot(id).await?;
    Ok(Json(SpotResponse {
        success: true,
        spot: SpotView::from(spot),
    }))
}
