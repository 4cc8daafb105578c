use chrono::{DateTime, FixedOffset};
use quickpark::{
    application::{PaymentDetails, PaymentRequest},
    domain::{
        parking::{Currency, PaymentId, PaymentMethod, PaymentStatus, ReservationId, SpotId},
        Entity,
    },
};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, PickFirst};

use super::{local, spot::SpotView, ListMeta};

/// `POST /api/payments` の本文
#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentBody {
    #[serde_as(as = "Option<PickFirst<(DisplayFromStr, _)>>")]
    #[serde(default)]
    pub parking_spot_id: Option<SpotId>,
    /// 分
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub method: Option<PaymentMethod>,
}

impl From<CreatePaymentBody> for PaymentRequest {
    fn from(body: CreatePaymentBody) -> Self {
        Self {
            spot_id: body.parking_spot_id,
            duration_minutes: body.duration,
            method: body.method,
        }
    }
}

#[serde_as]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentView {
    #[serde_as(as = "DisplayFromStr")]
    pub id: PaymentId,
    #[serde_as(as = "DisplayFromStr")]
    pub parking_spot_id: SpotId,
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub reservation_id: Option<ReservationId>,
    pub user_id: String,
    pub amount: f64,
    pub currency: Currency,
    pub duration: u32,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub created_at: DateTime<FixedOffset>,
    pub expires_at: DateTime<FixedOffset>,
    pub spot: SpotView,
}

impl PaymentView {
    pub fn new(details: PaymentDetails, offset: &FixedOffset) -> Self {
        let p = details.payment;
        Self {
            id: p.id(),
            parking_spot_id: p.spot_id(),
            reservation_id: p.reservation_id(),
            user_id: p.payer().to_string(),
            amount: p.amount().as_major(),
            currency: p.amount().currency(),
            duration: p.duration_minutes(),
            method: p.method(),
            status: p.status(),
            created_at: local(p.created_at(), offset),
            expires_at: local(p.window_end(), offset),
            spot: SpotView::from(details.spot),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub success: bool,
    pub payment: PaymentView,
}

impl PaymentResponse {
    pub fn new(details: PaymentDetails, offset: &FixedOffset) -> Self {
        Self {
            success: true,
            payment: PaymentView::new(details, offset),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentListResponse {
    pub success: bool,
    pub payments: Vec<PaymentView>,
    pub meta: ListMeta,
}

impl PaymentListResponse {
    pub fn new(payments: Vec<PaymentDetails>, offset: &FixedOffset) -> Self {
        let payments: Vec<PaymentView> = payments
            .into_iter()
            .map(|d| PaymentView::new(d, offset))
            .collect();
        Self {
            success: true,
            meta: ListMeta {
                total: payments.len(),
            },
            payments,
        }
    }
}
