use chrono::{DateTime, FixedOffset, Utc};
use quickpark::{
    application::{CreateReservation, ReservationDetails, ReservationList, ServiceError},
    domain::{
        identity::UserId,
        parking::{ReservationId, ReservationStatus, SpotId},
        Entity,
    },
};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, PickFirst};

use super::{local, spot::SpotView};

/// `POST /api/reservations` の本文
#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReservationBody {
    #[serde_as(as = "Option<PickFirst<(DisplayFromStr, _)>>")]
    #[serde(default)]
    pub parking_spot_id: Option<SpotId>,
    #[serde(default)]
    pub end_date_time: Option<DateTime<FixedOffset>>,
    /// 管理者が代理で予約する利用者
    #[serde(default, alias = "userId")]
    pub clerk_id: Option<String>,
}

impl TryFrom<CreateReservationBody> for CreateReservation {
    type Error = ServiceError;

    fn try_from(body: CreateReservationBody) -> Result<Self, Self::Error> {
        match (body.parking_spot_id, body.end_date_time) {
            (Some(spot_id), Some(end)) => Ok(CreateReservation {
                spot_id,
                end_date_time: end.with_timezone(&Utc),
                on_behalf_of: body.clerk_id.map(UserId::new),
            }),
            (spot_id, end) => {
                let mut missing = Vec::new();
                if spot_id.is_none() {
                    missing.push("parkingSpotId");
                }
                if end.is_none() {
                    missing.push("endDateTime");
                }
                Err(ServiceError::MissingFields(missing))
            }
        }
    }
}

/// `PATCH /api/reservations/:id` の本文
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendReservationBody {
    #[serde(default)]
    pub extra_minutes: Option<i64>,
}

#[serde_as]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationView {
    #[serde_as(as = "DisplayFromStr")]
    pub id: ReservationId,
    #[serde_as(as = "DisplayFromStr")]
    pub parking_spot_id: SpotId,
    pub user_id: String,
    pub start_date_time: DateTime<FixedOffset>,
    pub end_date_time: DateTime<FixedOffset>,
    pub duration: i64,
    pub status: ReservationStatus,
    pub created_at: DateTime<FixedOffset>,
    pub updated_at: DateTime<FixedOffset>,
    pub spot: SpotView,
}

impl ReservationView {
    pub fn new(details: ReservationDetails, offset: &FixedOffset) -> Self {
        let r = details.reservation;
        Self {
            id: r.id(),
            parking_spot_id: r.spot_id(),
            user_id: r.user_id().to_string(),
            start_date_time: local(r.start_date_time(), offset),
            end_date_time: local(r.end_date_time(), offset),
            duration: r.duration().num_minutes(),
            status: r.status(),
            created_at: local(r.created_at(), offset),
            updated_at: local(r.updated_at(), offset),
            spot: SpotView::from(details.spot),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReservationResponse {
    pub success: bool,
    pub reservation: ReservationView,
}

impl ReservationResponse {
    pub fn new(details: ReservationDetails, offset: &FixedOffset) -> Self {
        Self {
            success: true,
            reservation: ReservationView::new(details, offset),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReservationGroups {
    pub active: Vec<ReservationView>,
    pub completed: Vec<ReservationView>,
    pub cancelled: Vec<ReservationView>,
}

#[derive(Debug, Serialize)]
pub struct ReservationStats {
    pub total: usize,
    pub active: usize,
    pub completed: usize,
    pub cancelled: usize,
}

/// 状態ごとの予約一覧と件数
#[derive(Debug, Serialize)]
pub struct ReservationListResponse {
    pub success: bool,
    pub data: ReservationGroups,
    pub meta: ReservationStats,
}

impl ReservationListResponse {
    pub fn new(list: ReservationList, offset: &FixedOffset) -> Self {
        let meta = ReservationStats {
            total: list.total(),
            active: list.active.len(),
            completed: list.completed.len(),
            cancelled: list.cancelled.len(),
        };
        let views = |group: Vec<ReservationDetails>| -> Vec<ReservationView> {
            group
                .into_iter()
                .map(|d| ReservationView::new(d, offset))
                .collect()
        };
        Self {
            success: true,
            data: ReservationGroups {
                active: views(list.active),
                completed: views(list.completed),
                cancelled: views(list.cancelled),
            },
            meta,
        }
    }
}
