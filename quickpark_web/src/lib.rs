pub mod error;
pub mod extractor;
mod handler;
mod model;

use std::sync::Arc;

use axum::{
    routing::get,
    Router,
};
use chrono::FixedOffset;
use quickpark::{application::ParkingService, domain::identity::IdentityProvider};

/// ハンドラで共有する状態
#[derive(Clone)]
pub struct AppState {
    pub service: ParkingService,
    pub identity: Arc<dyn IdentityProvider>,
    /// 日時の表示に使うタイムゾーン
    pub offset: FixedOffset,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/parking-spots", get(handler::spot::list_spots))
        .route("/api/parking-spots/:id", get(handler::spot::get_spot))
        .route(
            "/api/reservations",
            get(handler::reservation::list_reservations)
                .post(handler::reservation::create_reservation),
        )
        .route(
            "/api/reservations/:id",
            get(handler::reservation::get_reservation)
                .patch(handler::reservation::extend_reservation)
                .delete(handler::reservation::cancel_reservation),
        )
        .route(
            "/api/payments",
            get(handler::payment::list_payments).post(handler::payment::create_payment),
        )
        .route("/api/payments/:id", get(handler::payment::get_payment))
        .route(
            "/api/dashboard/reservations",
            get(handler::reservation::dashboard_reservations),
        )
        .route(
            "/api/dashboard/payments",
            get(handler::payment::dashboard_payments),
        )
        .with_state(state)
}
