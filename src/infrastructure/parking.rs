use std::collections::BTreeSet;

use async_trait::async_trait;
use eventstore::{
    AppendToStreamOptions, Client, EventData, ExpectedRevision, ReadStreamOptions, ResolvedEvent,
};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{
    identity::UserId,
    parking::{
        ParkingSpot, ParkingSpotRepository, Payment, PaymentId, Reservation, ReservationId,
        SpotEvent, SpotId,
    },
    Aggregation, DataAccessError, Entity,
};
use crate::infrastructure::{
    from_event, index_entries, stream_name, try_from_resolved_event, EventConvertError,
    IndexEntry,
};

/// 全駐車スペースの索引ストリーム
const CATALOG_STREAM: &str = "spot_catalog";
/// 索引イベントの種別
const SPOT_LINKED: &str = "SpotLinked";

/// 索引ストリームに積む参照
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct SpotLink {
    spot_id: SpotId,
}

impl TryFrom<SpotLink> for EventData {
    type Error = EventConvertError;

    fn try_from(value: SpotLink) -> Result<Self, Self::Error> {
        Ok(EventData::json(SPOT_LINKED, value)?)
    }
}

impl TryFrom<&ResolvedEvent> for SpotLink {
    type Error = EventConvertError;

    fn try_from(value: &ResolvedEvent) -> Result<Self, Self::Error> {
        let event = value.get_original_event();
        match event.event_type.as_str() {
            SPOT_LINKED => Ok(serde_json::from_slice(event.data.as_ref())?),
            _ => Err(EventConvertError),
        }
    }
}

fn user_stream(user_id: &UserId) -> String {
    format!("user_spots-{}", user_id)
}

/// EventStoreDBのリポジトリ
///
/// 駐車スペースごとに `spot-{id}` ストリームを持ち、予約・支払い・利用者からの参照は
/// 別の索引ストリームに書く。索引は本体より先に書くので、本体の追記に失敗しても
/// 残るのは参照先に存在しないリンクだけになる。
#[derive(Clone)]
pub struct EventStoreParkingSpotRepository {
    client: Client,
}

impl EventStoreParkingSpotRepository {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// 索引ストリームに積まれた駐車スペースID
    async fn linked_spots(&self, index: String) -> Result<Vec<SpotId>, DataAccessError> {
        let mut ids = BTreeSet::new();
        let mut stream = match self
            .client
            .read_stream(index, &ReadStreamOptions::default())
            .await
        {
            Ok(stream) => stream,
            Err(eventstore::Error::ResourceNotFound) | Err(eventstore::Error::ResourceDeleted) => {
                return Ok(Vec::new())
            }
            Err(e) => return Err(e.into()),
        };
        loop {
            match stream.next().await {
                Ok(Some(e)) => {
                    ids.insert(SpotLink::try_from(&e)?.spot_id);
                }
                Ok(None) => break,
                Err(eventstore::Error::ResourceNotFound)
                | Err(eventstore::Error::ResourceDeleted) => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(ids.into_iter().collect())
    }

    async fn load_all(&self, ids: Vec<SpotId>) -> Result<Vec<ParkingSpot>, DataAccessError> {
        let spots = try_join_all(ids.into_iter().map(|id| self.find_by_id(id))).await?;
        Ok(spots.into_iter().flatten().collect())
    }

    async fn link(&self, index: String, spot_id: SpotId) -> Result<(), DataAccessError> {
        self.client
            .append_to_stream(
                index,
                &AppendToStreamOptions::default().expected_revision(ExpectedRevision::Any),
                EventData::try_from(SpotLink { spot_id })?,
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ParkingSpotRepository for EventStoreParkingSpotRepository {
    async fn find_by_id(&self, id: SpotId) -> Result<Option<ParkingSpot>, DataAccessError> {
        let mut stream = match self
            .client
            .read_stream(stream_name::<ParkingSpot>(id), &ReadStreamOptions::default())
            .await
        {
            Ok(stream) => stream,
            Err(eventstore::Error::ResourceNotFound) | Err(eventstore::Error::ResourceDeleted) => {
                return Ok(None)
            }
            Err(e) => return Err(e.into()),
        };
        let mut events = Vec::new();
        let mut revision = None;
        loop {
            match stream.next().await {
                Ok(Some(e)) => {
                    revision = Some(e.get_original_event().revision);
                    events.push(SpotEvent::try_from(&e)?);
                }
                Ok(None) => break,
                Err(eventstore::Error::ResourceNotFound)
                | Err(eventstore::Error::ResourceDeleted) => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(revision.map(|revision| ParkingSpot::replay(events, revision)))
    }

    async fn find_by_reservation_id(
        &self,
        id: ReservationId,
    ) -> Result<Option<ParkingSpot>, DataAccessError> {
        let ids = self.linked_spots(stream_name::<Reservation>(id)).await?;
        Ok(self
            .load_all(ids)
            .await?
            .into_iter()
            .find(|spot| spot.reservation(id).is_some()))
    }

    async fn find_by_payment_id(
        &self,
        id: PaymentId,
    ) -> Result<Option<ParkingSpot>, DataAccessError> {
        let ids = self.linked_spots(stream_name::<Payment>(id)).await?;
        Ok(self
            .load_all(ids)
            .await?
            .into_iter()
            .find(|spot| spot.payment(id).is_some()))
    }

    async fn find_by_user_id(&self, user_id: &UserId) -> Result<Vec<ParkingSpot>, DataAccessError> {
        let ids = self.linked_spots(user_stream(user_id)).await?;
        self.load_all(ids).await
    }

    async fn find_all(&self) -> Result<Vec<ParkingSpot>, DataAccessError> {
        let ids = self.linked_spots(CATALOG_STREAM.to_owned()).await?;
        self.load_all(ids).await
    }

    async fn save(&self, entity: &mut ParkingSpot) -> Result<bool, DataAccessError> {
        if entity.events().is_empty() {
            return Ok(false);
        }
        let id = entity.id();
        for entry in index_entries(entity.iter()) {
            let index = match &entry {
                IndexEntry::Reservation { id, .. } => stream_name::<Reservation>(*id),
                IndexEntry::Payment { id, .. } => stream_name::<Payment>(*id),
            };
            self.link(index, id).await?;
            self.link(user_stream(entry.user_id()), id).await?;
        }
        let rev = match entity.version() {
            Some(revision) => ExpectedRevision::Exact(revision),
            None => {
                self.link(CATALOG_STREAM.to_owned(), id).await?;
                ExpectedRevision::NoStream
            }
        };
        let data = entity
            .iter()
            .map(from_event)
            .collect::<Result<Vec<_>, _>>()?;
        let result = self
            .client
            .append_to_stream(
                stream_name::<ParkingSpot>(id),
                &AppendToStreamOptions::default().expected_revision(rev),
                data,
            )
            .await?;
        entity.clear();
        entity.set_version(Some(result.next_expected_version));
        debug!(
            "駐車スペース {} を保存しました (リビジョン {})",
            id, result.next_expected_version
        );
        Ok(true)
    }
}

impl TryFrom<&SpotEvent> for EventData {
    type Error = EventConvertError;

    fn try_from(value: &SpotEvent) -> Result<Self, Self::Error> {
        from_event(value)
    }
}

impl TryFrom<&ResolvedEvent> for SpotEvent {
    type Error = EventConvertError;

    fn try_from(value: &ResolvedEvent) -> Result<Self, Self::Error> {
        try_from_resolved_event(value)
    }
}
