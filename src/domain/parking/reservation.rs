use chrono::{DateTime, Duration, Utc};
use derive_more::{Deref, Display, From, FromStr};
use serde::{Deserialize, Serialize};

use crate::domain::{identity::UserId, Aggregation, Entity, Id};

use super::{ParkingError, ParkingSpot, SpotEvent, SpotId, MAX_RESERVATION_MINUTES};

/// 予約ID
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
pub struct ReservationId(u64);

impl Id for ReservationId {
    type Inner = u64;
}

/// 予約の状態
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    #[default]
    Active,
    Completed,
    Cancelled,
}

/// 予約 (最大15分の仮押さえ)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    id: ReservationId,
    user_id: UserId,
    spot_id: SpotId,
    start_date_time: DateTime<Utc>,
    end_date_time: DateTime<Utc>,
    status: ReservationStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Reservation {
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn spot_id(&self) -> SpotId {
        self.spot_id
    }

    pub fn start_date_time(&self) -> DateTime<Utc> {
        self.start_date_time
    }

    pub fn end_date_time(&self) -> DateTime<Utc> {
        self.end_date_time
    }

    pub fn status(&self) -> ReservationStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn duration(&self) -> Duration {
        self.end_date_time - self.start_date_time
    }

    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Active
    }

    /// 終了時刻を過ぎているか
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.end_date_time < now
    }

    pub(super) fn extend_to(&mut self, end_date_time: DateTime<Utc>, at: DateTime<Utc>) {
        self.end_date_time = end_date_time;
        self.updated_at = at;
    }

    pub(super) fn finish(&mut self, status: ReservationStatus, at: DateTime<Utc>) {
        self.status = status;
        self.updated_at = at;
    }
}

impl Entity for Reservation {
    type Id = ReservationId;

    const ENTITY_NAME: &'static str = "reservation";

    fn id(&self) -> Self::Id {
        self.id
    }
}

impl ParkingSpot {
    pub fn reservation(&self, id: ReservationId) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    /// 有効な予約 (同時に一つまで)
    pub fn active_reservation(&self) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.is_active())
    }

    pub fn active_reservation_of(&self, user_id: &UserId) -> Option<&Reservation> {
        self.reservations
            .iter()
            .find(|r| r.is_active() && r.user_id == *user_id)
    }

    /// 予約を作成する
    pub fn reserve(
        &mut self,
        reservation_id: ReservationId,
        user_id: UserId,
        end_date_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<&Reservation, ParkingError> {
        if self.is_occupied(now) {
            return Err(ParkingError::PaymentInProgress);
        }
        if !(self.is_available && self.can_reserve) {
            return Err(ParkingError::SpotUnavailable);
        }
        let duration = end_date_time - now;
        if duration <= Duration::zero() || duration > Duration::minutes(MAX_RESERVATION_MINUTES) {
            return Err(ParkingError::InvalidDuration);
        }
        self.record(SpotEvent::ReservationCreated {
            id: self.id,
            reservation: Reservation {
                id: reservation_id,
                user_id,
                spot_id: self.id,
                start_date_time: now,
                end_date_time,
                status: ReservationStatus::Active,
                created_at: now,
                updated_at: now,
            },
        })?;
        self.mark_reserved()?;
        self.reservation(reservation_id)
            .ok_or(ParkingError::ReservationNotFound)
    }

    /// 予約を延長する
    ///
    /// 終了時刻を過ぎていた場合は予約を終了させたうえで `AlreadyEnded` を返す。
    pub fn extend_reservation(
        &mut self,
        reservation_id: ReservationId,
        extra_minutes: i64,
        now: DateTime<Utc>,
    ) -> Result<&Reservation, ParkingError> {
        let reservation = self
            .reservation(reservation_id)
            .ok_or(ParkingError::ReservationNotFound)?;
        match reservation.status {
            ReservationStatus::Active => {}
            ReservationStatus::Completed => return Err(ParkingError::AlreadyEnded),
            ReservationStatus::Cancelled => return Err(ParkingError::NotActive),
        }
        if reservation.end_date_time <= now {
            self.complete_reservation(reservation_id, now)?;
            return Err(ParkingError::AlreadyEnded);
        }
        if extra_minutes <= 0 {
            return Err(ParkingError::InvalidExtension);
        }
        if extra_minutes > MAX_RESERVATION_MINUTES {
            return Err(ParkingError::DurationExceeded);
        }
        let extra = Duration::minutes(extra_minutes);
        if reservation.duration() + extra > Duration::minutes(MAX_RESERVATION_MINUTES) {
            return Err(ParkingError::DurationExceeded);
        }
        let end_date_time = reservation.end_date_time + extra;
        self.record(SpotEvent::ReservationExtended {
            id: self.id,
            reservation_id,
            end_date_time,
            extended_at: now,
        })?;
        self.reservation(reservation_id)
            .ok_or(ParkingError::ReservationNotFound)
    }

    /// 予約をキャンセルする
    pub fn cancel_reservation(
        &mut self,
        reservation_id: ReservationId,
        now: DateTime<Utc>,
    ) -> Result<&Reservation, ParkingError> {
        self.validate_active_reservation(&reservation_id)?;
        self.record(SpotEvent::ReservationCancelled {
            id: self.id,
            reservation_id,
            cancelled_at: now,
        })?;
        self.release_if_unheld()?;
        self.reservation(reservation_id)
            .ok_or(ParkingError::ReservationNotFound)
    }

    /// 終了時刻を過ぎた有効な予約を終了させる。それ以外は何もしない。
    pub fn reconcile_reservation_expiry(
        &mut self,
        reservation_id: ReservationId,
        now: DateTime<Utc>,
    ) -> Result<bool, ParkingError> {
        match self.reservation(reservation_id) {
            Some(r) if r.is_active() && r.is_expired(now) => {
                self.complete_reservation(reservation_id, now)?;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(ParkingError::ReservationNotFound),
        }
    }

    fn complete_reservation(
        &mut self,
        reservation_id: ReservationId,
        now: DateTime<Utc>,
    ) -> Result<(), ParkingError> {
        self.record(SpotEvent::ReservationCompleted {
            id: self.id,
            reservation_id,
            completed_at: now,
        })?;
        self.release_if_unheld()
    }

    /// 有効な予約が残っていなければ予約可能に戻す
    pub(super) fn release_if_unheld(&mut self) -> Result<(), ParkingError> {
        match self.active_reservation() {
            Some(_) => Ok(()),
            None => self.mark_reservable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::parking::{
        fixtures::{now, spot},
        PaymentMethod, PaymentStatus,
    };

    fn user() -> UserId {
        UserId::new("clerk-001")
    }

    #[test]
    fn test_reserve() {
        let mut entity = spot(463543);
        let reservation = entity
            .reserve(1.into(), user(), now() + Duration::minutes(10), now())
            .unwrap()
            .clone();
        assert_eq!(reservation.status(), ReservationStatus::Active);
        assert_eq!(reservation.start_date_time(), now());
        assert_eq!(reservation.end_date_time(), now() + Duration::minutes(10));
        assert_eq!(reservation.user_id(), &user());
        assert!(!entity.can_reserve());
        assert!(entity.is_available());
    }

    #[test]
    fn test_second_reservation_conflicts() {
        let mut entity = spot(463543);
        entity
            .reserve(1.into(), user(), now() + Duration::minutes(10), now())
            .unwrap();
        assert_eq!(
            entity
                .reserve(
                    2.into(),
                    UserId::new("clerk-002"),
                    now() + Duration::minutes(5),
                    now()
                )
                .err(),
            Some(ParkingError::SpotUnavailable)
        );
        assert_eq!(entity.reservations().len(), 1);
    }

    #[test]
    fn test_reserve_duration_bounds() {
        let mut entity = spot(463543);
        for end in [now(), now() - Duration::minutes(1), now() + Duration::seconds(15 * 60 + 1)] {
            assert_eq!(
                entity.reserve(1.into(), user(), end, now()).err(),
                Some(ParkingError::InvalidDuration)
            );
        }
        assert!(entity.events().is_empty());
        assert!(entity
            .reserve(1.into(), user(), now() + Duration::minutes(15), now())
            .is_ok());
    }

    #[test]
    fn test_reserve_during_payment_window() {
        let mut entity = spot(463543);
        entity
            .pay(
                1.into(),
                UserId::new("clerk-002"),
                30,
                PaymentMethod::ApplePay,
                &|| PaymentStatus::Completed,
                now(),
            )
            .unwrap();
        assert_eq!(
            entity
                .reserve(2.into(), user(), now() + Duration::minutes(20), now() + Duration::minutes(10))
                .err(),
            Some(ParkingError::PaymentInProgress)
        );
    }

    #[test]
    fn test_reserve_unavailable_spot() {
        let mut entity = spot(463543);
        entity.mark_occupied().unwrap();
        assert_eq!(
            entity
                .reserve(1.into(), user(), now() + Duration::minutes(5), now())
                .err(),
            Some(ParkingError::SpotUnavailable)
        );
    }

    #[test]
    fn test_extend() {
        let mut entity = spot(463543);
        entity
            .reserve(1.into(), user(), now() + Duration::minutes(10), now())
            .unwrap();
        let later = now() + Duration::minutes(3);
        let reservation = entity.extend_reservation(1.into(), 5, later).unwrap();
        assert_eq!(reservation.end_date_time(), now() + Duration::minutes(15));
        assert_eq!(reservation.updated_at(), later);
        assert_eq!(
            entity.extend_reservation(1.into(), 1, later).err(),
            Some(ParkingError::DurationExceeded)
        );
    }

    #[test]
    fn test_extend_rejects_huge_extension() {
        let mut entity = spot(463543);
        entity
            .reserve(1.into(), user(), now() + Duration::minutes(10), now())
            .unwrap();
        entity.clear();
        assert_eq!(
            entity.extend_reservation(1.into(), i64::MAX, now()).err(),
            Some(ParkingError::DurationExceeded)
        );
        assert_eq!(
            entity.extend_reservation(1.into(), 16, now()).err(),
            Some(ParkingError::DurationExceeded)
        );
        assert!(entity.events().is_empty());
        assert_eq!(
            entity.reservation(1.into()).unwrap().end_date_time(),
            now() + Duration::minutes(10)
        );
    }

    #[test]
    fn test_extend_rejects_non_positive_minutes() {
        let mut entity = spot(463543);
        entity
            .reserve(1.into(), user(), now() + Duration::minutes(10), now())
            .unwrap();
        assert_eq!(
            entity.extend_reservation(1.into(), 0, now()).err(),
            Some(ParkingError::InvalidExtension)
        );
        assert_eq!(
            entity.extend_reservation(1.into(), -3, now()).err(),
            Some(ParkingError::InvalidExtension)
        );
        assert_eq!(
            entity.extend_reservation(9.into(), 3, now()).err(),
            Some(ParkingError::ReservationNotFound)
        );
    }

    #[test]
    fn test_extend_after_end_completes_reservation() {
        let mut entity = spot(463543);
        entity
            .reserve(1.into(), user(), now() + Duration::minutes(10), now())
            .unwrap();
        entity.clear();
        let at_end = now() + Duration::minutes(10);
        assert_eq!(
            entity.extend_reservation(1.into(), 2, at_end).err(),
            Some(ParkingError::AlreadyEnded)
        );
        assert_eq!(
            entity.reservation(1.into()).map(Reservation::status),
            Some(ReservationStatus::Completed)
        );
        assert!(entity.can_reserve());
        assert_eq!(entity.events().len(), 2);
        assert_eq!(
            entity.extend_reservation(1.into(), 2, at_end).err(),
            Some(ParkingError::AlreadyEnded)
        );
    }

    #[test]
    fn test_cancel() {
        let mut entity = spot(463543);
        entity
            .reserve(1.into(), user(), now() + Duration::minutes(10), now())
            .unwrap();
        let reservation = entity.cancel_reservation(1.into(), now()).unwrap();
        assert_eq!(reservation.status(), ReservationStatus::Cancelled);
        assert!(entity.can_reserve());
        assert_eq!(
            entity.cancel_reservation(1.into(), now()).err(),
            Some(ParkingError::NotActive)
        );
        assert_eq!(
            entity.extend_reservation(1.into(), 1, now()).err(),
            Some(ParkingError::NotActive)
        );
        assert_eq!(
            entity.cancel_reservation(2.into(), now()).err(),
            Some(ParkingError::ReservationNotFound)
        );
    }

    #[test]
    fn test_reconcile_expiry_is_idempotent() {
        let mut entity = spot(463543);
        entity
            .reserve(1.into(), user(), now() + Duration::minutes(10), now())
            .unwrap();
        entity.clear();
        assert!(!entity
            .reconcile_reservation_expiry(1.into(), now() + Duration::minutes(10))
            .unwrap());
        let later = now() + Duration::minutes(11);
        assert!(entity.reconcile_reservation_expiry(1.into(), later).unwrap());
        let state = entity.clone();
        assert!(!entity.reconcile_reservation_expiry(1.into(), later).unwrap());
        assert_eq!(entity, state);
        assert_eq!(entity.events().len(), 2);
        assert_eq!(
            entity.reservation(1.into()).map(Reservation::status),
            Some(ReservationStatus::Completed)
        );
        assert!(entity.can_reserve());
    }
}
