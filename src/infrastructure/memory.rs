use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{
    identity::UserId,
    parking::{
        ParkingSpot, ParkingSpotRepository, PaymentId, ReservationId, SpotEvent, SpotId,
    },
    Aggregation, DataAccessError, Entity,
};
use crate::infrastructure::{index_entries, stream_name, IndexEntry};

#[derive(Debug, Default)]
struct Store {
    streams: HashMap<SpotId, Vec<SpotEvent>>,
    reservations: HashMap<ReservationId, SpotId>,
    payments: HashMap<PaymentId, SpotId>,
    users: HashMap<UserId, BTreeSet<SpotId>>,
}

impl Store {
    fn load(&self, id: SpotId) -> Option<ParkingSpot> {
        let events = self.streams.get(&id)?;
        let revision = events.len().checked_sub(1)? as u64;
        Some(ParkingSpot::replay(events.iter().cloned(), revision))
    }
}

/// メモリ上のリポジトリ
///
/// ストリームへの追記と索引の更新は同じ書き込みロックの中で行う。
#[derive(Debug, Default)]
pub struct MemoryParkingSpotRepository {
    store: RwLock<Store>,
}

impl MemoryParkingSpotRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ParkingSpotRepository for MemoryParkingSpotRepository {
    async fn find_by_id(&self, id: SpotId) -> Result<Option<ParkingSpot>, DataAccessError> {
        Ok(self.store.read().await.load(id))
    }

    async fn find_by_reservation_id(
        &self,
        id: ReservationId,
    ) -> Result<Option<ParkingSpot>, DataAccessError> {
        let store = self.store.read().await;
        Ok(store
            .reservations
            .get(&id)
            .and_then(|spot_id| store.load(*spot_id)))
    }

    async fn find_by_payment_id(
        &self,
        id: PaymentId,
    ) -> Result<Option<ParkingSpot>, DataAccessError> {
        let store = self.store.read().await;
        Ok(store
            .payments
            .get(&id)
            .and_then(|spot_id| store.load(*spot_id)))
    }

    async fn find_by_user_id(&self, user_id: &UserId) -> Result<Vec<ParkingSpot>, DataAccessError> {
        let store = self.store.read().await;
        Ok(store
            .users
            .get(user_id)
            .map(|ids| ids.iter().filter_map(|id| store.load(*id)).collect())
            .unwrap_or_default())
    }

    async fn find_all(&self) -> Result<Vec<ParkingSpot>, DataAccessError> {
        let store = self.store.read().await;
        let mut ids: Vec<SpotId> = store.streams.keys().copied().collect();
        ids.sort();
        Ok(ids.into_iter().filter_map(|id| store.load(id)).collect())
    }

    async fn save(&self, entity: &mut ParkingSpot) -> Result<bool, DataAccessError> {
        if entity.events().is_empty() {
            return Ok(false);
        }
        let mut store = self.store.write().await;
        let current = store
            .streams
            .get(&entity.id())
            .and_then(|events| events.len().checked_sub(1))
            .map(|revision| revision as u64);
        if current != entity.version() {
            return Err(DataAccessError::Conflict(stream_name::<ParkingSpot>(
                entity.id(),
            )));
        }
        let events = entity.pop_all();
        for entry in index_entries(&events) {
            store
                .users
                .entry(entry.user_id().clone())
                .or_default()
                .insert(entity.id());
            match entry {
                IndexEntry::Reservation { id, .. } => {
                    store.reservations.insert(id, entity.id());
                }
                IndexEntry::Payment { id, .. } => {
                    store.payments.insert(id, entity.id());
                }
            }
        }
        let stream = store.streams.entry(entity.id()).or_default();
        stream.extend(events);
        entity.set_version(Some(stream.len() as u64 - 1));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::domain::parking::{
        fixtures::{listing, now},
        PaymentMethod, PaymentStatus,
    };

    #[tokio::test]
    async fn test_memory_repository() {
        // リポジトリ作成
        let repository = MemoryParkingSpotRepository::new();

        // 登録
        let mut entity = ParkingSpot::register(listing(463543)).unwrap();
        assert!(repository.save(&mut entity).await.unwrap());
        assert_eq!(entity.version(), Some(0));
        assert!(!repository.save(&mut entity).await.unwrap());

        // 予約と支払い
        entity
            .reserve(
                1.into(),
                UserId::new("clerk-001"),
                now() + Duration::minutes(10),
                now(),
            )
            .unwrap();
        entity
            .pay(
                2.into(),
                UserId::new("clerk-002"),
                30,
                PaymentMethod::CreditCard,
                &|| PaymentStatus::Failed,
                now(),
            )
            .unwrap_err();
        assert!(repository.save(&mut entity).await.unwrap());
        assert_eq!(entity.version(), Some(2));

        // 検索
        let found = repository.find_by_id(463543.into()).await.unwrap().unwrap();
        assert_eq!(found, entity);
        assert_eq!(found.version(), Some(2));
        assert!(found.events().is_empty());
        assert_eq!(
            repository.find_by_reservation_id(1.into()).await.unwrap(),
            Some(entity.clone())
        );
        assert_eq!(repository.find_by_payment_id(2.into()).await.unwrap(), None);
        assert_eq!(
            repository
                .find_by_user_id(&UserId::new("clerk-001"))
                .await
                .unwrap()
                .len(),
            1
        );
        assert!(repository
            .find_by_user_id(&UserId::new("clerk-002"))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(repository.find_by_id(1.into()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_repository_rejects_stale_writer() {
        let repository = MemoryParkingSpotRepository::new();
        let mut entity = ParkingSpot::register(listing(463543)).unwrap();
        repository.save(&mut entity).await.unwrap();

        let mut first = repository.find_by_id(463543.into()).await.unwrap().unwrap();
        let mut second = repository.find_by_id(463543.into()).await.unwrap().unwrap();
        first
            .reserve(
                1.into(),
                UserId::new("clerk-001"),
                now() + Duration::minutes(10),
                now(),
            )
            .unwrap();
        second
            .reserve(
                2.into(),
                UserId::new("clerk-002"),
                now() + Duration::minutes(10),
                now(),
            )
            .unwrap();

        assert!(repository.save(&mut first).await.unwrap());
        assert!(matches!(
            repository.save(&mut second).await,
            Err(DataAccessError::Conflict(stream)) if stream == "spot-463543"
        ));
        assert_eq!(repository.find_by_reservation_id(2.into()).await.unwrap(), None);

        // 新規登録の重複も競合になる
        let mut duplicate = ParkingSpot::register(listing(463543)).unwrap();
        assert!(matches!(
            repository.save(&mut duplicate).await,
            Err(DataAccessError::Conflict(_))
        ));
    }
}
