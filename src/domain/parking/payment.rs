use chrono::{DateTime, Duration, Utc};
use derive_more::{Deref, Display, From, FromStr};
use serde::{Deserialize, Serialize};

use crate::domain::{identity::UserId, Aggregation, Entity, Id};

use super::{
    Money, ParkingError, ParkingSpot, ReservationId, SpotEvent, SpotId, MIN_PAYMENT_MINUTES,
};

/// 支払いID
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
pub struct PaymentId(u64);

impl Id for PaymentId {
    type Inner = u64;
}

/// 決済の状態
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

/// 支払い方法
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    CreditCard,
    ApplePay,
    GooglePay,
}

/// 支払い
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    id: PaymentId,
    payer: UserId,
    spot_id: SpotId,
    reservation_id: Option<ReservationId>,
    amount: Money,
    duration_minutes: u32,
    method: PaymentMethod,
    status: PaymentStatus,
    created_at: DateTime<Utc>,
}

impl Payment {
    pub fn payer(&self) -> &UserId {
        &self.payer
    }

    pub fn spot_id(&self) -> SpotId {
        self.spot_id
    }

    pub fn reservation_id(&self) -> Option<ReservationId> {
        self.reservation_id
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn duration_minutes(&self) -> u32 {
        self.duration_minutes
    }

    pub fn method(&self) -> PaymentMethod {
        self.method
    }

    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// 利用期間の終わり (この時刻は含まない)
    pub fn window_end(&self) -> DateTime<Utc> {
        self.created_at + Duration::minutes(i64::from(self.duration_minutes))
    }

    /// `now` が `[created_at, window_end)` に含まれ、かつ失敗していない
    pub fn is_in_window(&self, now: DateTime<Utc>) -> bool {
        self.status != PaymentStatus::Failed && self.created_at <= now && now < self.window_end()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.window_end()
    }
}

impl Entity for Payment {
    type Id = PaymentId;

    const ENTITY_NAME: &'static str = "payment";

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// 決済の結果を決める
pub trait Settlement: Send + Sync {
    fn settle(&self) -> PaymentStatus;
}

impl<F> Settlement for F
where
    F: Fn() -> PaymentStatus + Send + Sync,
{
    fn settle(&self) -> PaymentStatus {
        self()
    }
}

/// 一様乱数で成功か失敗かを決める模擬決済
#[derive(Clone, Copy, Debug)]
pub struct RandomSettlement {
    success_rate: f64,
}

impl RandomSettlement {
    pub fn new(success_rate: f64) -> Self {
        Self {
            success_rate: success_rate.clamp(0.0, 1.0),
        }
    }
}

impl Default for RandomSettlement {
    fn default() -> Self {
        Self::new(0.8)
    }
}

impl Settlement for RandomSettlement {
    fn settle(&self) -> PaymentStatus {
        match rand::random::<f64>() < self.success_rate {
            true => PaymentStatus::Completed,
            false => PaymentStatus::Failed,
        }
    }
}

impl ParkingSpot {
    pub fn payment(&self, id: PaymentId) -> Option<&Payment> {
        self.payments.iter().find(|p| p.id == id)
    }

    /// 支払いを作成する
    ///
    /// 失敗以外の結果なら駐車スペースを押さえ、有効な予約をすべてキャンセルする。
    /// 支払い者自身の有効な予約は `reservation_id` として紐付ける。
    /// その予約を持つ支払い者に限り、`can_reserve` が偽でも支払える。
    pub fn pay(
        &mut self,
        payment_id: PaymentId,
        payer: UserId,
        duration_minutes: u32,
        method: PaymentMethod,
        settlement: &dyn Settlement,
        now: DateTime<Utc>,
    ) -> Result<&Payment, ParkingError> {
        let reservation_id = self.active_reservation_of(&payer).map(|r| r.id());
        if !(self.is_available && (self.can_reserve || reservation_id.is_some())) {
            return Err(ParkingError::SpotUnavailable);
        }
        if duration_minutes < MIN_PAYMENT_MINUTES {
            return Err(ParkingError::DurationTooShort {
                min: MIN_PAYMENT_MINUTES,
            });
        }
        if duration_minutes > self.max_duration_minutes {
            return Err(ParkingError::DurationTooLong {
                max: self.max_duration_minutes,
            });
        }
        let amount = self
            .price_per_hour
            .per_hour_for(duration_minutes)
            .ok_or(ParkingError::InvalidListing)?;
        let status = settlement.settle();
        self.record(SpotEvent::PaymentCreated {
            id: self.id,
            payment: Payment {
                id: payment_id,
                payer,
                spot_id: self.id,
                reservation_id,
                amount,
                duration_minutes,
                method,
                status,
                created_at: now,
            },
        })?;
        if status != PaymentStatus::Failed {
            self.mark_occupied()?;
            self.mark_reserved()?;
            let active: Vec<ReservationId> = self
                .reservations
                .iter()
                .filter(|r| r.is_active())
                .map(|r| r.id())
                .collect();
            for reservation_id in active {
                self.record(SpotEvent::ReservationCancelled {
                    id: self.id,
                    reservation_id,
                    cancelled_at: now,
                })?;
            }
        }
        self.payment(payment_id).ok_or(ParkingError::PaymentNotFound)
    }

    /// 利用期間が過ぎた支払いについて、他に有効な期間がなければ駐車スペースを空ける
    pub fn reconcile_payment_expiry(
        &mut self,
        payment_id: PaymentId,
        now: DateTime<Utc>,
    ) -> Result<bool, ParkingError> {
        let payment = self
            .payment(payment_id)
            .ok_or(ParkingError::PaymentNotFound)?;
        if payment.status == PaymentStatus::Failed
            || !payment.is_expired(now)
            || self.is_available
            || self.is_occupied(now)
        {
            return Ok(false);
        }
        self.mark_free()?;
        Ok(true)
    }
}
