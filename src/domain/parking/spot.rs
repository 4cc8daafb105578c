use async_trait::async_trait;
use chrono::{DateTime, Utc};
use derive_more::{Deref, Display, From, FromStr};
use serde::{Deserialize, Serialize};

use crate::domain::{Aggregation, DataAccessError, Id};

use super::{Money, ParkingError, ParkingSpot, Payment, Reservation, SpotEvent};

/// 駐車スペースID (市の標識番号)
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    From,
    FromStr,
    Deref,
    Default,
)]
pub struct SpotId(u64);

impl Id for SpotId {
    type Inner = u64;
}

/// カタログ上の駐車スペース
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpotListing {
    pub id: SpotId,
    pub name: String,
    pub address: String,
    pub price_per_hour: Money,
    pub max_duration_minutes: u32,
    pub is_available: bool,
    pub can_reserve: bool,
}

/// 駐車スペースの供給元
#[async_trait]
pub trait SpotCatalog: Send + Sync {
    async fn fetch(&self) -> Result<Vec<SpotListing>, DataAccessError>;
}

impl ParkingSpot {
    /// カタログの内容で駐車スペースを登録する
    pub fn register(listing: SpotListing) -> Result<Self, ParkingError> {
        let mut entity = ParkingSpot::default();
        entity.record(SpotEvent::SpotRegistered {
            id: listing.id,
            name: listing.name,
            address: listing.address,
            price_per_hour: listing.price_per_hour,
            max_duration_minutes: listing.max_duration_minutes,
            is_available: listing.is_available,
            can_reserve: listing.can_reserve,
        })?;
        Ok(entity)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn price_per_hour(&self) -> Money {
        self.price_per_hour
    }

    pub fn max_duration_minutes(&self) -> u32 {
        self.max_duration_minutes
    }

    /// 保存されている空き状態
    pub fn is_available(&self) -> bool {
        self.is_available
    }

    /// 保存されている予約可否
    pub fn can_reserve(&self) -> bool {
        self.can_reserve
    }

    pub fn reservations(&self) -> &[Reservation] {
        &self.reservations
    }

    pub fn payments(&self) -> &[Payment] {
        &self.payments
    }

    /// `now` に有効な支払い期間があるか
    pub fn is_occupied(&self, now: DateTime<Utc>) -> bool {
        self.payments.iter().any(|p| p.is_in_window(now))
    }

    /// `now` に有効な予約がないか
    pub fn is_reservable(&self, now: DateTime<Utc>) -> bool {
        !self
            .reservations
            .iter()
            .any(|r| r.is_active() && !r.is_expired(now))
    }

    pub(crate) fn mark_occupied(&mut self) -> Result<(), ParkingError> {
        match self.is_available {
            true => self.record(SpotEvent::SpotOccupied { id: self.id }),
            false => Ok(()),
        }
    }

    pub(crate) fn mark_free(&mut self) -> Result<(), ParkingError> {
        match self.is_available {
            true => Ok(()),
            false => self.record(SpotEvent::SpotFreed { id: self.id }),
        }
    }

    pub(crate) fn mark_reserved(&mut self) -> Result<(), ParkingError> {
        match self.can_reserve {
            true => self.record(SpotEvent::SpotReserved { id: self.id }),
            false => Ok(()),
        }
    }

    pub(crate) fn mark_reservable(&mut self) -> Result<(), ParkingError> {
        match self.can_reserve {
            true => Ok(()),
            false => self.record(SpotEvent::SpotReservable { id: self.id }),
        }
    }
}
