use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::Entity;

use super::{ParkingError, ParkingSpot, PaymentId, ReservationId};

/// 整合処理で行われた変更
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// 期限切れで終了した予約
    pub completed_reservations: Vec<ReservationId>,
    /// 予約可能に戻ったか
    pub released: bool,
    /// 空きに戻ったか
    pub freed: bool,
}

impl Reconciliation {
    pub fn is_empty(&self) -> bool {
        self.completed_reservations.is_empty() && !self.released && !self.freed
    }
}

impl ParkingSpot {
    /// 時間経過で古くなった状態を直す
    ///
    /// 1. 終了時刻を過ぎた有効な予約を終了させ、有効な予約がなければ予約可能に戻す
    /// 2. 利用期間が過ぎた支払いしかなければ空きに戻す
    ///
    /// 同じ `now` で二度呼んでも二度目は何も記録しない。
    pub fn reconcile(&mut self, now: DateTime<Utc>) -> Result<Reconciliation, ParkingError> {
        let mut result = Reconciliation::default();
        let was_reservable = self.can_reserve;
        let was_available = self.is_available;

        let expired: Vec<ReservationId> = self
            .reservations
            .iter()
            .filter(|r| r.is_active() && r.is_expired(now))
            .map(|r| r.id())
            .collect();
        for reservation_id in expired {
            if self.reconcile_reservation_expiry(reservation_id, now)? {
                result.completed_reservations.push(reservation_id);
            }
        }
        self.release_if_unheld()?;

        let lapsed: Vec<PaymentId> = self
            .payments
            .iter()
            .filter(|p| p.is_expired(now))
            .map(|p| p.id())
            .collect();
        for payment_id in lapsed {
            self.reconcile_payment_expiry(payment_id, now)?;
        }
        if !self.is_occupied(now) {
            self.mark_free()?;
        }

        result.released = !was_reservable && self.can_reserve;
        result.freed = !was_available && self.is_available;

        if !result.is_empty() {
            debug!(
                "駐車スペース {} を整合: 予約終了 {:?}, 予約可能 {}, 空き {}",
                self.id(),
                result.completed_reservations,
                result.released,
                result.freed
            );
        }
        Ok(result)
    }
}
