use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    Json,
};
use quickpark::{application::PaymentRequest, domain::parking::PaymentId};

use crate::{
    error::ApiResult,
    extractor::AuthorizedCaller,
    model::payment::{CreatePaymentBody, PaymentListResponse, PaymentResponse},
    AppState,
};

pub async fn list_payments(
    State(state): State<AppState>,
    AuthorizedCaller(caller): AuthorizedCaller,
) -> ApiResult<Json<PaymentListResponse>> {
    let payments = state.service.list_payments(&caller).await?;
    Ok(Json(PaymentListResponse::new(payments, &state.offset)))
}

pub async fn create_payment(
    State(state): State<AppState>,
    AuthorizedCaller(caller): AuthorizedCaller,
    body: Result<Json<CreatePaymentBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<PaymentResponse>)> {
    let Json(body) = body?;
    let details = state
        .service
        .create_payment(&caller, PaymentRequest::from(body))
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(PaymentResponse::new(details, &state.offset)),
    ))
}

pub async fn get_payment(
    State(state): State<AppState>,
    AuthorizedCaller(caller): AuthorizedCaller,
    id: Result<Path<PaymentId>, PathRejection>,
) -> ApiResult<Json<PaymentResponse>> {
    let Path(id) = id?;
    let details = state.service.get_payment(&caller, id).await?;
    Ok(Json(PaymentResponse::new(details, &state.offset)))
}

pub async fn dashboard_payments(
    State(state): State<AppState>,
    AuthorizedCaller(caller): AuthorizedCaller,
) -> ApiResult<Json<PaymentListResponse>> {
    let payments = state.service.dashboard_payments(&caller).await?;
    Ok(Json(PaymentListResponse::new(payments, &state.offset)))
}
