mod money;
mod payment;
mod reconcile;
mod reservation;
mod spot;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Aggregation, DataAccessError, Entity, Event, EventQueue, EventQueueIntoIter};

use super::identity::UserId;

pub use self::money::*;
pub use self::payment::*;
pub use self::reconcile::*;
pub use self::reservation::*;
pub use self::spot::*;

/// 予約の最大長 (分)
pub const MAX_RESERVATION_MINUTES: i64 = 15;
/// 支払いの最小時間 (分)
pub const MIN_PAYMENT_MINUTES: u32 = 5;
/// 時間単価の上限 (セント)
pub const MAX_PRICE_PER_HOUR_CENTS: i64 = 100_000;

/// 駐車スペースのリポジトリ
///
/// 駐車スペースはその予約と支払いを含めて一つのストリームとして保存される。
#[async_trait]
pub trait ParkingSpotRepository: Send + Sync {
    /// IDで駐車スペースを検索する
    async fn find_by_id(&self, id: SpotId) -> Result<Option<ParkingSpot>, DataAccessError>;
    /// 予約IDから駐車スペースを検索する
    async fn find_by_reservation_id(
        &self,
        id: ReservationId,
    ) -> Result<Option<ParkingSpot>, DataAccessError>;
    /// 支払いIDから駐車スペースを検索する
    async fn find_by_payment_id(&self, id: PaymentId)
        -> Result<Option<ParkingSpot>, DataAccessError>;
    /// 利用者が予約または支払いをした駐車スペースを検索する
    async fn find_by_user_id(&self, user_id: &UserId) -> Result<Vec<ParkingSpot>, DataAccessError>;
    /// すべての駐車スペース
    async fn find_all(&self) -> Result<Vec<ParkingSpot>, DataAccessError>;
    /// 未保存のイベントを保存する
    ///
    /// 読み込み時のバージョンから変わっていれば `DataAccessError::Conflict` を返す。
    async fn save(&self, entity: &mut ParkingSpot) -> Result<bool, DataAccessError>;
}

/// 駐車スペースのイベント
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpotEvent {
    /// カタログから登録された
    SpotRegistered {
        id: SpotId,
        name: String,
        address: String,
        price_per_hour: Money,
        max_duration_minutes: u32,
        is_available: bool,
        can_reserve: bool,
    },
    /// 使用中になった
    SpotOccupied { id: SpotId },
    /// 空いた
    SpotFreed { id: SpotId },
    /// 予約で押さえられた
    SpotReserved { id: SpotId },
    /// 予約可能に戻った
    SpotReservable { id: SpotId },
    /// 予約が作成された
    ReservationCreated { id: SpotId, reservation: Reservation },
    /// 予約が延長された
    ReservationExtended {
        id: SpotId,
        reservation_id: ReservationId,
        end_date_time: DateTime<Utc>,
        extended_at: DateTime<Utc>,
    },
    /// 予約がキャンセルされた
    ReservationCancelled {
        id: SpotId,
        reservation_id: ReservationId,
        cancelled_at: DateTime<Utc>,
    },
    /// 予約が終了した
    ReservationCompleted {
        id: SpotId,
        reservation_id: ReservationId,
        completed_at: DateTime<Utc>,
    },
    /// 支払いが作成された
    PaymentCreated { id: SpotId, payment: Payment },
}

impl Event for SpotEvent {
    type Id = SpotId;
}

/// 駐車スペースエンティティ
#[derive(Debug, Default, Clone)]
pub struct ParkingSpot {
    id: SpotId,
    registered: bool,
    name: String,
    address: String,
    price_per_hour: Money,
    max_duration_minutes: u32,
    is_available: bool,
    can_reserve: bool,
    reservations: Vec<Reservation>,
    payments: Vec<Payment>,
    version: Option<u64>,
    events: EventQueue<SpotEvent>,
}

impl ParkingSpot {
    fn validate_id(&self, id: &SpotId) -> Result<(), ParkingError> {
        match self.registered && self.id == *id {
            true => Ok(()),
            false => Err(ParkingError::MismatchedId),
        }
    }

    fn validate_active_reservation(
        &self,
        reservation_id: &ReservationId,
    ) -> Result<(), ParkingError> {
        match self.reservation(*reservation_id) {
            Some(r) if r.status() == ReservationStatus::Active => Ok(()),
            Some(_) => Err(ParkingError::NotActive),
            None => Err(ParkingError::ReservationNotFound),
        }
    }

    fn reservation_mut(&mut self, id: ReservationId) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id() == id)
    }
}

impl Entity for ParkingSpot {
    type Id = SpotId;

    const ENTITY_NAME: &'static str = "spot";

    fn id(&self) -> Self::Id {
        self.id
    }
}

impl Aggregation for ParkingSpot {
    type Event = SpotEvent;
    type Error = ParkingError;

    fn validate(&self, event: &Self::Event) -> Result<(), Self::Error> {
        match event {
            SpotEvent::SpotRegistered {
                price_per_hour,
                max_duration_minutes,
                ..
            } => {
                if self.registered {
                    return Err(ParkingError::AlreadyRegistered);
                }
                if *max_duration_minutes < MIN_PAYMENT_MINUTES
                    || !(0..=MAX_PRICE_PER_HOUR_CENTS).contains(&price_per_hour.amount())
                {
                    return Err(ParkingError::InvalidListing);
                }
                Ok(())
            }
            SpotEvent::SpotOccupied { id }
            | SpotEvent::SpotFreed { id }
            | SpotEvent::SpotReserved { id }
            | SpotEvent::SpotReservable { id } => self.validate_id(id),
            SpotEvent::ReservationCreated { id, reservation } => {
                self.validate_id(id)?;
                if reservation.spot_id() != *id {
                    return Err(ParkingError::MismatchedId);
                }
                match self.reservation(reservation.id()) {
                    Some(_) => Err(ParkingError::DuplicateReservation),
                    None => Ok(()),
                }
            }
            SpotEvent::ReservationExtended {
                id,
                reservation_id,
                ..
            }
            | SpotEvent::ReservationCancelled {
                id,
                reservation_id,
                ..
            }
            | SpotEvent::ReservationCompleted {
                id,
                reservation_id,
                ..
            } => {
                self.validate_id(id)?;
                self.validate_active_reservation(reservation_id)
            }
            SpotEvent::PaymentCreated { id, payment } => {
                self.validate_id(id)?;
                if payment.spot_id() != *id {
                    return Err(ParkingError::MismatchedId);
                }
                match self.payment(payment.id()) {
                    Some(_) => Err(ParkingError::DuplicatePayment),
                    None => Ok(()),
                }
            }
        }
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            SpotEvent::SpotRegistered {
                id,
                name,
                address,
                price_per_hour,
                max_duration_minutes,
                is_available,
                can_reserve,
            } => {
                self.id = id;
                self.registered = true;
                self.name = name;
                self.address = address;
                self.price_per_hour = price_per_hour;
                self.max_duration_minutes = max_duration_minutes;
                self.is_available = is_available;
                self.can_reserve = can_reserve;
            }
            SpotEvent::SpotOccupied { .. } => self.is_available = false,
            SpotEvent::SpotFreed { .. } => self.is_available = true,
            SpotEvent::SpotReserved { .. } => self.can_reserve = false,
            SpotEvent::SpotReservable { .. } => self.can_reserve = true,
            SpotEvent::ReservationCreated { reservation, .. } => {
                self.reservations.push(reservation)
            }
            SpotEvent::ReservationExtended {
                reservation_id,
                end_date_time,
                extended_at,
                ..
            } => {
                if let Some(r) = self.reservation_mut(reservation_id) {
                    r.extend_to(end_date_time, extended_at);
                }
            }
            SpotEvent::ReservationCancelled {
                reservation_id,
                cancelled_at,
                ..
            } => {
                if let Some(r) = self.reservation_mut(reservation_id) {
                    r.finish(ReservationStatus::Cancelled, cancelled_at);
                }
            }
            SpotEvent::ReservationCompleted {
                reservation_id,
                completed_at,
                ..
            } => {
                if let Some(r) = self.reservation_mut(reservation_id) {
                    r.finish(ReservationStatus::Completed, completed_at);
                }
            }
            SpotEvent::PaymentCreated { payment, .. } => self.payments.push(payment),
        }
    }

    fn version(&self) -> Option<u64> {
        self.version
    }

    fn set_version(&mut self, version: Option<u64>) {
        self.version = version;
    }

    fn events(&self) -> &EventQueue<Self::Event> {
        &self.events
    }

    fn events_mut(&mut self) -> &mut EventQueue<Self::Event> {
        &mut self.events
    }
}

impl IntoIterator for ParkingSpot {
    type Item = SpotEvent;
    type IntoIter = EventQueueIntoIter<Self::Item>;
    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

impl PartialEq for ParkingSpot {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.address == other.address
            && self.price_per_hour == other.price_per_hour
            && self.max_duration_minutes == other.max_duration_minutes
            && self.is_available == other.is_available
            && self.can_reserve == other.can_reserve
            && self.reservations == other.reservations
            && self.payments == other.payments
    }
}

impl Eq for ParkingSpot {}

/// 駐車スペースのエラー
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParkingError {
    #[error("ID does not match")]
    MismatchedId,
    #[error("Spot is already registered")]
    AlreadyRegistered,
    #[error("Invalid spot listing")]
    InvalidListing,
    #[error("Spot is not available or cannot be reserved")]
    SpotUnavailable,
    #[error("A payment is in progress for this spot")]
    PaymentInProgress,
    #[error("Reservation must end after now and last at most 15 minutes")]
    InvalidDuration,
    #[error("Reservation not found")]
    ReservationNotFound,
    #[error("Reservation has already ended")]
    AlreadyEnded,
    #[error("Reservation is not active")]
    NotActive,
    #[error("Extra minutes must be greater than zero")]
    InvalidExtension,
    #[error("Maximum reservation duration exceeded (15 min)")]
    DurationExceeded,
    #[error("Duplicate reservation")]
    DuplicateReservation,
    #[error("Payment not found")]
    PaymentNotFound,
    #[error("Duplicate payment")]
    DuplicatePayment,
    #[error("Duration too short (min {min} min)")]
    DurationTooShort { min: u32 },
    #[error("Duration too long (max {max} min)")]
    DurationTooLong { max: u32 },
}
