use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::domain::{
    identity::{authorize, require_admin, AccessDenied, Caller, IdentityError, UserId},
    parking::{
        Money, ParkingError, ParkingSpot, ParkingSpotRepository, Payment, PaymentId,
        PaymentMethod, Reservation, ReservationId, ReservationStatus, Settlement, SpotCatalog,
        SpotId,
    },
    Clock, DataAccessError, Entity, IdGeneratorStopped, IdGeneratorTask,
};

/// 予約作成コマンド
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateReservation {
    pub spot_id: SpotId,
    pub end_date_time: DateTime<Utc>,
    /// 管理者が他の利用者の代わりに予約する場合の利用者
    pub on_behalf_of: Option<UserId>,
}

/// 支払い作成コマンド (未指定の項目は `MissingFields` になる)
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PaymentRequest {
    pub spot_id: Option<SpotId>,
    pub duration_minutes: Option<u32>,
    pub method: Option<PaymentMethod>,
}

/// 駐車スペースの概要
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpotSummary {
    pub id: SpotId,
    pub name: String,
    pub address: String,
    pub price_per_hour: Money,
    pub max_duration_minutes: u32,
    pub is_available: bool,
    pub can_reserve: bool,
}

impl From<&ParkingSpot> for SpotSummary {
    fn from(spot: &ParkingSpot) -> Self {
        Self {
            id: spot.id(),
            name: spot.name().to_owned(),
            address: spot.address().to_owned(),
            price_per_hour: spot.price_per_hour(),
            max_duration_minutes: spot.max_duration_minutes(),
            is_available: spot.is_available(),
            can_reserve: spot.can_reserve(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReservationDetails {
    pub reservation: Reservation,
    pub spot: SpotSummary,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentDetails {
    pub payment: Payment,
    pub spot: SpotSummary,
}

/// 状態ごとに分けた予約一覧
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReservationList {
    pub active: Vec<ReservationDetails>,
    pub completed: Vec<ReservationDetails>,
    pub cancelled: Vec<ReservationDetails>,
}

impl ReservationList {
    fn push(&mut self, details: ReservationDetails) {
        match details.reservation.status() {
            ReservationStatus::Active => self.active.push(details),
            ReservationStatus::Completed => self.completed.push(details),
            ReservationStatus::Cancelled => self.cancelled.push(details),
        }
    }

    fn sort(&mut self) {
        for group in [&mut self.active, &mut self.completed, &mut self.cancelled] {
            group.sort_by(|a, b| b.reservation.created_at().cmp(&a.reservation.created_at()));
        }
    }

    pub fn total(&self) -> usize {
        self.active.len() + self.completed.len() + self.cancelled.len()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthenticated,
    Forbidden,
    NotFound,
    Validation,
    Conflict,
    Upstream,
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Unauthenticated(#[from] IdentityError),
    #[error("Forbidden")]
    Forbidden(#[from] AccessDenied),
    #[error("Parking spot not found")]
    SpotNotFound,
    #[error("Reservation not found")]
    ReservationNotFound,
    #[error("Payment not found")]
    PaymentNotFound,
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error(transparent)]
    Rule(#[from] ParkingError),
    #[error("Concurrent update lost: {0}")]
    Conflict(ParkingError),
    #[error(transparent)]
    DataAccess(#[from] DataAccessError),
    #[error(transparent)]
    IdGenerator(#[from] IdGeneratorStopped),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Unauthenticated(_) => ErrorKind::Unauthenticated,
            ServiceError::Forbidden(_) => ErrorKind::Forbidden,
            ServiceError::SpotNotFound
            | ServiceError::ReservationNotFound
            | ServiceError::PaymentNotFound => ErrorKind::NotFound,
            ServiceError::MissingFields(_) => ErrorKind::Validation,
            ServiceError::Rule(e) => match e {
                ParkingError::SpotUnavailable
                | ParkingError::PaymentInProgress
                | ParkingError::DuplicateReservation
                | ParkingError::DuplicatePayment => ErrorKind::Conflict,
                ParkingError::ReservationNotFound | ParkingError::PaymentNotFound => {
                    ErrorKind::NotFound
                }
                ParkingError::InvalidDuration
                | ParkingError::AlreadyEnded
                | ParkingError::NotActive
                | ParkingError::InvalidExtension
                | ParkingError::DurationExceeded
                | ParkingError::DurationTooShort { .. }
                | ParkingError::DurationTooLong { .. } => ErrorKind::Validation,
                ParkingError::MismatchedId
                | ParkingError::AlreadyRegistered
                | ParkingError::InvalidListing => ErrorKind::Upstream,
            },
            ServiceError::Conflict(_) | ServiceError::DataAccess(DataAccessError::Conflict(_)) => {
                ErrorKind::Conflict
            }
            ServiceError::DataAccess(_) | ServiceError::IdGenerator(_) => ErrorKind::Upstream,
        }
    }
}

/// 予約と支払いの窓口
///
/// どの操作も最初に対象の駐車スペースを整合させ、その結果は操作が失敗しても保存する。
#[derive(Clone)]
pub struct ParkingService {
    repository: Arc<dyn ParkingSpotRepository>,
    settlement: Arc<dyn Settlement>,
    clock: Arc<dyn Clock>,
    ids: IdGeneratorTask,
}

impl ParkingService {
    pub fn new(
        repository: Arc<dyn ParkingSpotRepository>,
        settlement: Arc<dyn Settlement>,
        clock: Arc<dyn Clock>,
        ids: IdGeneratorTask,
    ) -> Self {
        Self {
            repository,
            settlement,
            clock,
            ids,
        }
    }

    pub async fn create_reservation(
        &self,
        caller: &Caller,
        command: CreateReservation,
    ) -> Result<ReservationDetails, ServiceError> {
        let user_id = match command.on_behalf_of {
            Some(user_id) => {
                authorize(caller, &user_id)?;
                user_id
            }
            None => caller.user_id.clone(),
        };
        let reservation_id: ReservationId = self.ids.generate().await?;
        let now = self.clock.now();
        let mut spot = self.load(command.spot_id).await?;
        spot.reconcile(now)?;
        let outcome = spot
            .reserve(reservation_id, user_id, command.end_date_time, now)
            .cloned()
            .map_err(ServiceError::from);
        let reservation = self.persist(&mut spot, outcome).await?;
        info!(
            "予約を作成しました: {} (駐車スペース {}, 利用者 {})",
            reservation.id(),
            spot.id(),
            reservation.user_id()
        );
        Ok(details(reservation, &spot))
    }

    pub async fn extend_reservation(
        &self,
        caller: &Caller,
        reservation_id: ReservationId,
        extra_minutes: i64,
    ) -> Result<ReservationDetails, ServiceError> {
        let now = self.clock.now();
        let mut spot = self.load_by_reservation(reservation_id).await?;
        spot.reconcile(now)?;
        let outcome = match owned_reservation(&spot, caller, reservation_id) {
            Ok(()) => spot
                .extend_reservation(reservation_id, extra_minutes, now)
                .cloned()
                .map_err(ServiceError::from),
            Err(e) => Err(e),
        };
        let reservation = self.persist(&mut spot, outcome).await?;
        info!(
            "予約を延長しました: {} (終了 {})",
            reservation.id(),
            reservation.end_date_time()
        );
        Ok(details(reservation, &spot))
    }

    pub async fn cancel_reservation(
        &self,
        caller: &Caller,
        reservation_id: ReservationId,
    ) -> Result<ReservationDetails, ServiceError> {
        let now = self.clock.now();
        let mut spot = self.load_by_reservation(reservation_id).await?;
        spot.reconcile(now)?;
        let outcome = match owned_reservation(&spot, caller, reservation_id) {
            Ok(()) => spot
                .cancel_reservation(reservation_id, now)
                .cloned()
                .map_err(ServiceError::from),
            Err(e) => Err(e),
        };
        let reservation = self.persist(&mut spot, outcome).await?;
        info!("予約をキャンセルしました: {}", reservation.id());
        Ok(details(reservation, &spot))
    }

    pub async fn get_reservation(
        &self,
        caller: &Caller,
        reservation_id: ReservationId,
    ) -> Result<ReservationDetails, ServiceError> {
        let spot = self.load_by_reservation(reservation_id).await?;
        let spot = self.observe(spot).await?;
        owned_reservation(&spot, caller, reservation_id)?;
        let reservation = spot
            .reservation(reservation_id)
            .cloned()
            .ok_or(ServiceError::ReservationNotFound)?;
        Ok(details(reservation, &spot))
    }

    pub async fn create_payment(
        &self,
        caller: &Caller,
        request: PaymentRequest,
    ) -> Result<PaymentDetails, ServiceError> {
        let (spot_id, duration_minutes, method) =
            match (request.spot_id, request.duration_minutes, request.method) {
                (Some(spot_id), Some(duration), Some(method)) => (spot_id, duration, method),
                (spot_id, duration, method) => {
                    let mut missing = Vec::new();
                    if spot_id.is_none() {
                        missing.push("parkingSpotId");
                    }
                    if duration.is_none() {
                        missing.push("duration");
                    }
                    if method.is_none() {
                        missing.push("method");
                    }
                    return Err(ServiceError::MissingFields(missing));
                }
            };
        let payment_id: PaymentId = self.ids.generate().await?;
        let now = self.clock.now();
        let mut spot = self.load(spot_id).await?;
        spot.reconcile(now)?;
        let outcome = spot
            .pay(
                payment_id,
                caller.user_id.clone(),
                duration_minutes,
                method,
                self.settlement.as_ref(),
                now,
            )
            .cloned()
            .map_err(ServiceError::from);
        let payment = self.persist(&mut spot, outcome).await?;
        info!(
            "支払いを作成しました: {} (駐車スペース {}, {}, {:?})",
            payment.id(),
            spot.id(),
            payment.amount(),
            payment.status()
        );
        Ok(PaymentDetails {
            payment,
            spot: SpotSummary::from(&spot),
        })
    }

    pub async fn get_payment(
        &self,
        caller: &Caller,
        payment_id: PaymentId,
    ) -> Result<PaymentDetails, ServiceError> {
        let spot = self
            .repository
            .find_by_payment_id(payment_id)
            .await
            .map_err(upstream)?
            .ok_or(ServiceError::PaymentNotFound)?;
        let spot = self.observe(spot).await?;
        let payment = spot
            .payment(payment_id)
            .cloned()
            .ok_or(ServiceError::PaymentNotFound)?;
        authorize(caller, payment.payer())?;
        Ok(PaymentDetails {
            payment,
            spot: SpotSummary::from(&spot),
        })
    }

    /// 呼び出し元の予約一覧
    pub async fn list_reservations(&self, caller: &Caller) -> Result<ReservationList, ServiceError> {
        let spots = self
            .repository
            .find_by_user_id(&caller.user_id)
            .await
            .map_err(upstream)?;
        let mut list = ReservationList::default();
        for spot in spots {
            let spot = self.observe(spot).await?;
            spot.reservations()
                .iter()
                .filter(|r| *r.user_id() == caller.user_id)
                .for_each(|r| list.push(details(r.clone(), &spot)));
        }
        list.sort();
        Ok(list)
    }

    /// 呼び出し元の支払い一覧
    pub async fn list_payments(&self, caller: &Caller) -> Result<Vec<PaymentDetails>, ServiceError> {
        let spots = self
            .repository
            .find_by_user_id(&caller.user_id)
            .await
            .map_err(upstream)?;
        let mut payments = Vec::new();
        for spot in spots {
            let spot = self.observe(spot).await?;
            payments.extend(
                spot.payments()
                    .iter()
                    .filter(|p| *p.payer() == caller.user_id)
                    .map(|p| PaymentDetails {
                        payment: p.clone(),
                        spot: SpotSummary::from(&spot),
                    }),
            );
        }
        payments.sort_by(|a, b| b.payment.created_at().cmp(&a.payment.created_at()));
        Ok(payments)
    }

    /// すべての予約 (管理者のみ)
    pub async fn dashboard_reservations(
        &self,
        caller: &Caller,
    ) -> Result<ReservationList, ServiceError> {
        require_admin(caller)?;
        let mut list = ReservationList::default();
        for spot in self.all_spots().await? {
            for r in spot.reservations() {
                list.push(details(r.clone(), &spot));
            }
        }
        list.sort();
        Ok(list)
    }

    /// すべての支払い (管理者のみ)
    pub async fn dashboard_payments(
        &self,
        caller: &Caller,
    ) -> Result<Vec<PaymentDetails>, ServiceError> {
        require_admin(caller)?;
        let mut payments = Vec::new();
        for spot in self.all_spots().await? {
            for p in spot.payments() {
                payments.push(PaymentDetails {
                    payment: p.clone(),
                    spot: SpotSummary::from(&spot),
                });
            }
        }
        payments.sort_by(|a, b| b.payment.created_at().cmp(&a.payment.created_at()));
        Ok(payments)
    }

    pub async fn list_spots(&self) -> Result<Vec<SpotSummary>, ServiceError> {
        Ok(self
            .all_spots()
            .await?
            .iter()
            .map(SpotSummary::from)
            .collect())
    }

    pub async fn get_spot(&self, id: SpotId) -> Result<SpotSummary, ServiceError> {
        let spot = self.load(id).await?;
        let spot = self.observe(spot).await?;
        Ok(SpotSummary::from(&spot))
    }

    async fn load(&self, id: SpotId) -> Result<ParkingSpot, ServiceError> {
        self.repository
            .find_by_id(id)
            .await
            .map_err(upstream)?
            .ok_or(ServiceError::SpotNotFound)
    }

    async fn load_by_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<ParkingSpot, ServiceError> {
        self.repository
            .find_by_reservation_id(reservation_id)
            .await
            .map_err(upstream)?
            .ok_or(ServiceError::ReservationNotFound)
    }

    async fn all_spots(&self) -> Result<Vec<ParkingSpot>, ServiceError> {
        let spots = self.repository.find_all().await.map_err(upstream)?;
        let mut observed = Vec::with_capacity(spots.len());
        for spot in spots {
            observed.push(self.observe(spot).await?);
        }
        observed.sort_by_key(|s| s.id());
        Ok(observed)
    }

    /// 読み取り前の整合。競合した場合は他の要求が先に整合させている。
    async fn observe(&self, mut spot: ParkingSpot) -> Result<ParkingSpot, ServiceError> {
        spot.reconcile(self.clock.now())?;
        match self.repository.save(&mut spot).await {
            Ok(_) => Ok(spot),
            Err(DataAccessError::Conflict(stream)) => {
                debug!("整合結果の保存が競合しました: {}", stream);
                Ok(spot)
            }
            Err(e) => Err(upstream(e)),
        }
    }

    /// 未保存のイベントを保存して操作結果を返す
    ///
    /// 操作が成功していて保存が競合した場合は `Conflict` になる。
    async fn persist<T>(
        &self,
        spot: &mut ParkingSpot,
        outcome: Result<T, ServiceError>,
    ) -> Result<T, ServiceError> {
        match (self.repository.save(spot).await, outcome) {
            (Ok(_), outcome) => outcome,
            (Err(DataAccessError::Conflict(stream)), Ok(_)) => {
                warn!("駐車スペースの更新が競合しました: {}", stream);
                Err(ServiceError::Conflict(ParkingError::SpotUnavailable))
            }
            (Err(DataAccessError::Conflict(stream)), Err(e)) => {
                debug!("整合結果の保存が競合しました: {}", stream);
                Err(e)
            }
            (Err(e), _) => Err(upstream(e)),
        }
    }
}

/// カタログの駐車スペースのうち未登録のものを登録する
pub async fn import_spots(
    catalog: &dyn SpotCatalog,
    repository: &dyn ParkingSpotRepository,
) -> Result<usize, ServiceError> {
    let mut imported = 0;
    for listing in catalog.fetch().await.map_err(upstream)? {
        let id = listing.id;
        if repository.find_by_id(id).await.map_err(upstream)?.is_some() {
            continue;
        }
        let mut spot = match ParkingSpot::register(listing) {
            Ok(spot) => spot,
            Err(e) => {
                warn!("不正な駐車スペースの登録をスキップしました: {} ({})", id, e);
                continue;
            }
        };
        match repository.save(&mut spot).await {
            Ok(_) => imported += 1,
            Err(DataAccessError::Conflict(_)) => continue,
            Err(e) => return Err(upstream(e)),
        }
    }
    info!("駐車スペースを{}件登録しました", imported);
    Ok(imported)
}

fn upstream(e: DataAccessError) -> ServiceError {
    if !matches!(e, DataAccessError::Conflict(_)) {
        error!("データアクセスエラー: {}", e);
    }
    ServiceError::DataAccess(e)
}

fn details(reservation: Reservation, spot: &ParkingSpot) -> ReservationDetails {
    ReservationDetails {
        reservation,
        spot: SpotSummary::from(spot),
    }
}

fn owned_reservation(
    spot: &ParkingSpot,
    caller: &Caller,
    reservation_id: ReservationId,
) -> Result<(), ServiceError> {
    let reservation = spot
        .reservation(reservation_id)
        .ok_or(ServiceError::ReservationNotFound)?;
    Ok(authorize(caller, reservation.user_id())?)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::Duration;
    use snowflake::SnowflakeIdGenerator;

    use super::*;
    use crate::{
        domain::{
            parking::{
                fixtures::{listing, now},
                Currency, PaymentStatus,
            },
            Aggregation, ManualClock,
        },
        infrastructure::memory::MemoryParkingSpotRepository,
    };

    struct Fixture {
        service: ParkingService,
        clock: Arc<ManualClock>,
        repository: Arc<MemoryParkingSpotRepository>,
    }

    async fn fixture(settle: PaymentStatus) -> Fixture {
        let repository = Arc::new(MemoryParkingSpotRepository::default());
        for id in [463543, 472191] {
            let mut spot = ParkingSpot::register(listing(id)).unwrap();
            repository.save(&mut spot).await.unwrap();
        }
        let clock = Arc::new(ManualClock::new(now()));
        let service = ParkingService::new(
            repository.clone(),
            Arc::new(move || settle),
            clock.clone(),
            IdGeneratorTask::spawn(SnowflakeIdGenerator::new(1, 1).into()),
        );
        Fixture {
            service,
            clock,
            repository,
        }
    }

    fn reserve_for(minutes: i64) -> CreateReservation {
        CreateReservation {
            spot_id: 463543.into(),
            end_date_time: now() + Duration::minutes(minutes),
            on_behalf_of: None,
        }
    }

    fn pay_for(minutes: u32) -> PaymentRequest {
        PaymentRequest {
            spot_id: Some(463543.into()),
            duration_minutes: Some(minutes),
            method: Some(PaymentMethod::CreditCard),
        }
    }

    #[tokio::test]
    async fn test_create_then_get_reservation() {
        let f = fixture(PaymentStatus::Completed).await;
        let caller = Caller::user("clerk-001");
        let created = f
            .service
            .create_reservation(&caller, reserve_for(10))
            .await
            .unwrap();
        assert!(!created.spot.can_reserve);

        let found = f
            .service
            .get_reservation(&caller, created.reservation.id())
            .await
            .unwrap();
        assert_eq!(found.reservation.status(), ReservationStatus::Active);
        assert_eq!(
            found.reservation.end_date_time(),
            now() + Duration::minutes(10)
        );
        assert!(found.spot.is_available);
    }

    #[tokio::test]
    async fn test_second_reservation_conflicts() {
        let f = fixture(PaymentStatus::Completed).await;
        f.service
            .create_reservation(&Caller::user("clerk-001"), reserve_for(10))
            .await
            .unwrap();
        let err = f
            .service
            .create_reservation(&Caller::user("clerk-002"), reserve_for(5))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_expired_reservation_is_completed_on_read() {
        let f = fixture(PaymentStatus::Completed).await;
        let caller = Caller::user("clerk-001");
        let created = f
            .service
            .create_reservation(&caller, reserve_for(10))
            .await
            .unwrap();
        f.clock.advance(Duration::minutes(11));

        let found = f
            .service
            .get_reservation(&caller, created.reservation.id())
            .await
            .unwrap();
        assert_eq!(found.reservation.status(), ReservationStatus::Completed);
        assert!(found.spot.can_reserve);

        // 整合結果は保存されている
        let stored = f.repository.find_by_id(463543.into()).await.unwrap().unwrap();
        assert!(stored.can_reserve());
    }

    #[tokio::test]
    async fn test_payment_amount() {
        let f = fixture(PaymentStatus::Completed).await;
        let paid = f
            .service
            .create_payment(&Caller::user("clerk-001"), pay_for(10))
            .await
            .unwrap();
        assert_eq!(paid.payment.amount(), Money::new(58, Currency::CAD));
        assert_eq!(paid.payment.status(), PaymentStatus::Completed);
        assert!(!paid.spot.is_available);
        assert!(!paid.spot.can_reserve);
    }

    #[tokio::test]
    async fn test_payment_validation() {
        let f = fixture(PaymentStatus::Completed).await;
        let caller = Caller::user("clerk-001");
        let err = f
            .service
            .create_payment(&caller, pay_for(3))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.to_string(), "Duration too short (min 5 min)");

        let err = f
            .service
            .create_payment(
                &caller,
                PaymentRequest {
                    spot_id: Some(463543.into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.to_string(), "Missing required fields: duration, method");

        let err = f
            .service
            .create_payment(
                &caller,
                PaymentRequest {
                    spot_id: Some(1.into()),
                    ..pay_for(10)
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_expired_pending_payment_frees_spot() {
        let f = fixture(PaymentStatus::Pending).await;
        f.service
            .create_payment(&Caller::user("clerk-001"), pay_for(10))
            .await
            .unwrap();
        let spot = f.service.get_spot(463543.into()).await.unwrap();
        assert!(!spot.is_available);

        f.clock.advance(Duration::minutes(10));
        let spot = f.service.get_spot(463543.into()).await.unwrap();
        assert!(spot.is_available);
        assert!(spot.can_reserve);
    }

    #[tokio::test]
    async fn test_reservation_access_control() {
        let f = fixture(PaymentStatus::Completed).await;
        let owner = Caller::user("clerk-001");
        let created = f
            .service
            .create_reservation(&owner, reserve_for(10))
            .await
            .unwrap();
        let id = created.reservation.id();

        let other = Caller::user("clerk-002");
        let err = f.service.get_reservation(&other, id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        let err = f.service.cancel_reservation(&other, id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let admin = Caller::admin("clerk-admin");
        let cancelled = f.service.cancel_reservation(&admin, id).await.unwrap();
        assert_eq!(cancelled.reservation.status(), ReservationStatus::Cancelled);
        assert!(cancelled.spot.can_reserve);

        let err = f.service.get_reservation(&owner, 42.into()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_extend_reservation() {
        let f = fixture(PaymentStatus::Completed).await;
        let caller = Caller::user("clerk-001");
        let id = f
            .service
            .create_reservation(&caller, reserve_for(10))
            .await
            .unwrap()
            .reservation
            .id();
        let extended = f.service.extend_reservation(&caller, id, 5).await.unwrap();
        assert_eq!(
            extended.reservation.end_date_time(),
            now() + Duration::minutes(15)
        );
        let err = f
            .service
            .extend_reservation(&caller, id, 1)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        f.clock.advance(Duration::minutes(15));
        let err = f
            .service
            .extend_reservation(&caller, id, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Rule(ParkingError::AlreadyEnded)));
        let found = f.service.get_reservation(&caller, id).await.unwrap();
        assert_eq!(found.reservation.status(), ReservationStatus::Completed);
        assert!(found.spot.can_reserve);
    }

    #[tokio::test]
    async fn test_reservation_on_behalf_of() {
        let f = fixture(PaymentStatus::Completed).await;
        let command = CreateReservation {
            on_behalf_of: Some(UserId::new("clerk-002")),
            ..reserve_for(10)
        };
        let err = f
            .service
            .create_reservation(&Caller::user("clerk-001"), command.clone())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let created = f
            .service
            .create_reservation(&Caller::admin("clerk-admin"), command)
            .await
            .unwrap();
        assert_eq!(created.reservation.user_id(), &UserId::new("clerk-002"));
        let list = f
            .service
            .list_reservations(&Caller::user("clerk-002"))
            .await
            .unwrap();
        assert_eq!(list.active.len(), 1);
    }

    #[tokio::test]
    async fn test_payment_by_reservation_holder() {
        let f = fixture(PaymentStatus::Completed).await;
        let caller = Caller::user("clerk-001");
        let id = f
            .service
            .create_reservation(&caller, reserve_for(10))
            .await
            .unwrap()
            .reservation
            .id();
        let paid = f.service.create_payment(&caller, pay_for(30)).await.unwrap();
        assert_eq!(paid.payment.reservation_id(), Some(id));

        let list = f.service.list_reservations(&caller).await.unwrap();
        assert_eq!(list.total(), 1);
        assert_eq!(list.cancelled.len(), 1);

        let payments = f.service.list_payments(&caller).await.unwrap();
        assert_eq!(payments.len(), 1);
        let found = f
            .service
            .get_payment(&caller, paid.payment.id())
            .await
            .unwrap();
        assert_eq!(found.payment, paid.payment);
        let err = f
            .service
            .get_payment(&Caller::user("clerk-002"), paid.payment.id())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn test_dashboards_require_admin() {
        let f = fixture(PaymentStatus::Failed).await;
        f.service
            .create_payment(&Caller::user("clerk-001"), pay_for(10))
            .await
            .unwrap();
        f.service
            .create_reservation(&Caller::user("clerk-002"), reserve_for(5))
            .await
            .unwrap();

        let user = Caller::user("clerk-001");
        assert_eq!(
            f.service.dashboard_payments(&user).await.unwrap_err().kind(),
            ErrorKind::Forbidden
        );
        assert_eq!(
            f.service
                .dashboard_reservations(&user)
                .await
                .unwrap_err()
                .kind(),
            ErrorKind::Forbidden
        );

        let admin = Caller::admin("clerk-admin");
        let payments = f.service.dashboard_payments(&admin).await.unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].payment.status(), PaymentStatus::Failed);
        let reservations = f.service.dashboard_reservations(&admin).await.unwrap();
        assert_eq!(reservations.active.len(), 1);
    }

    #[tokio::test]
    async fn test_list_spots() {
        let f = fixture(PaymentStatus::Completed).await;
        let spots = f.service.list_spots().await.unwrap();
        assert_eq!(
            spots.iter().map(|s| s.id).collect::<Vec<_>>(),
            vec![SpotId::from(463543), SpotId::from(472191)]
        );
        assert_eq!(
            f.service.get_spot(1.into()).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    /// 保存が必ず競合するリポジトリ
    struct ContendedRepository;

    #[async_trait]
    impl ParkingSpotRepository for ContendedRepository {
        async fn find_by_id(&self, id: SpotId) -> Result<Option<ParkingSpot>, DataAccessError> {
            let mut spot = ParkingSpot::register(listing(*id)).map_err(|e| {
                DataAccessError::ClientSideError(Box::new(e))
            })?;
            spot.clear();
            Ok(Some(spot))
        }
        async fn find_by_reservation_id(
            &self,
            _id: ReservationId,
        ) -> Result<Option<ParkingSpot>, DataAccessError> {
            Ok(None)
        }
        async fn find_by_payment_id(
            &self,
            _id: PaymentId,
        ) -> Result<Option<ParkingSpot>, DataAccessError> {
            Ok(None)
        }
        async fn find_by_user_id(
            &self,
            _user_id: &UserId,
        ) -> Result<Vec<ParkingSpot>, DataAccessError> {
            Ok(Vec::new())
        }
        async fn find_all(&self) -> Result<Vec<ParkingSpot>, DataAccessError> {
            Ok(Vec::new())
        }
        async fn save(&self, entity: &mut ParkingSpot) -> Result<bool, DataAccessError> {
            if entity.events().is_empty() {
                return Ok(false);
            }
            Err(DataAccessError::Conflict(format!("spot-{}", entity.id())))
        }
    }

    #[tokio::test]
    async fn test_lost_update_is_reported_as_conflict() {
        let service = ParkingService::new(
            Arc::new(ContendedRepository),
            Arc::new(|| PaymentStatus::Completed),
            Arc::new(ManualClock::new(now())),
            IdGeneratorTask::spawn(SnowflakeIdGenerator::new(1, 1).into()),
        );
        let err = service
            .create_reservation(&Caller::user("clerk-001"), reserve_for(10))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Conflict(ParkingError::SpotUnavailable)
        ));
        assert_eq!(err.kind(), ErrorKind::Conflict);

        // 読み取りは競合しても成功する
        let spot = service.get_spot(463543.into()).await.unwrap();
        assert!(spot.can_reserve);
    }
}
