use quickpark::{
    application::SpotSummary,
    domain::parking::{Currency, SpotId},
};
use serde::Serialize;
use serde_with::{serde_as, DisplayFromStr};

use super::ListMeta;

#[serde_as]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotView {
    #[serde_as(as = "DisplayFromStr")]
    pub parking_spot_id: SpotId,
    pub name: String,
    pub address: String,
    pub price_per_hour: f64,
    pub currency: Currency,
    pub max_duration: u32,
    pub is_available: bool,
    pub can_reserve: bool,
}

impl From<SpotSummary> for SpotView {
    fn from(spot: SpotSummary) -> Self {
        Self {
            parking_spot_id: spot.id,
            name: spot.name,
            address: spot.address,
            price_per_hour: spot.price_per_hour.as_major(),
            currency: spot.price_per_hour.currency(),
            max_duration: spot.max_duration_minutes,
            is_available: spot.is_available,
            can_reserve: spot.can_reserve,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SpotResponse {
    pub success: bool,
    pub spot: SpotView,
}

#[derive(Debug, Serialize)]
pub struct SpotListResponse {
    pub success: bool,
    pub data: Vec<SpotView>,
    pub meta: ListMeta,
}

impl From<Vec<SpotSummary>> for SpotListResponse {
    fn from(spots: Vec<SpotSummary>) -> Self {
        let data: Vec<SpotView> = spots.into_iter().map(SpotView::from).collect();
        Self {
            success: true,
            meta: ListMeta { total: data.len() },
            data,
        }
    }
}
