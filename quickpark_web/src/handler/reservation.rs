use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    Json,
};
use quickpark::{application::CreateReservation, domain::parking::ReservationId};

use crate::{
    error::ApiResult,
    extractor::AuthorizedCaller,
    model::reservation::{
        CreateReservationBody, ExtendReservationBody, ReservationListResponse,
        ReservationResponse,
    },
    AppState,
};

pub async fn list_reservations(
    State(state): State<AppState>,
    AuthorizedCaller(caller): AuthorizedCaller,
) -> ApiResult<Json<ReservationListResponse>> {
    let list = state.service.list_reservations(&caller).await?;
    Ok(Json(ReservationListResponse::new(list, &state.offset)))
}

pub async fn create_reservation(
    State(state): State<AppState>,
    AuthorizedCaller(caller): AuthorizedCaller,
    body: Result<Json<CreateReservationBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ReservationResponse>)> {
    let Json(body) = body?;
    let command = CreateReservation::try_from(body)?;
    let details = state.service.create_reservation(&caller, command).await?;
    Ok((
        StatusCode::CREATED,
        Json(ReservationResponse::new(details, &state.offset)),
    ))
}

pub async fn get_reservation(
    State(state): State<AppState>,
    AuthorizedCaller(caller): AuthorizedCaller,
    id: Result<Path<ReservationId>, PathRejection>,
) -> ApiResult<Json<ReservationResponse>> {
    let Path(id) = id?;
    let details = state.service.get_reservation(&caller, id).await?;
    Ok(Json(ReservationResponse::new(details, &state.offset)))
}

/// `extraMinutes` を省略すると 0 分として扱い、延長は拒否される
pub async fn extend_reservation(
    State(state): State<AppState>,
    AuthorizedCaller(caller): AuthorizedCaller,
    id: Result<Path<ReservationId>, PathRejection>,
    body: Result<Json<ExtendReservationBody>, JsonRejection>,
) -> ApiResult<Json<ReservationResponse>> {
    let Path(id) = id?;
    let Json(body) = body?;
    let details = state
        .service
        .extend_reservation(&caller, id, body.extra_minutes.unwrap_or(0))
        .await?;
    Ok(Json(ReservationResponse::new(details, &state.offset)))
}

pub async fn cancel_reservation(
    State(state): State<AppState>,
    AuthorizedCaller(caller): AuthorizedCaller,
    id: Result<Path<ReservationId>, PathRejection>,
) -> ApiResult<Json<ReservationResponse>> {
    let Path(id) = id?;
    let details = state.service.cancel_reservation(&caller, id).await?;
    Ok(Json(ReservationResponse::new(details, &state.offset)))
}

pub async fn dashboard_reservations(
    State(state): State<AppState>,
    AuthorizedCaller(caller): AuthorizedCaller,
) -> ApiResult<Json<ReservationListResponse>> {
    let list = state.service.dashboard_reservations(&caller).await?;
    Ok(Json(ReservationListResponse::new(list, &state.offset)))
}
