pub mod catalog;
pub mod identity;
pub mod memory;
pub mod parking;

use eventstore::{EventData, ResolvedEvent};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::domain::{
    identity::UserId,
    parking::{PaymentId, ReservationId, SpotEvent},
    DataAccessError, Entity, Event, Id,
};

use std::str::FromStr;

impl From<eventstore::Error> for DataAccessError {
    fn from(value: eventstore::Error) -> Self {
        match value {
            eventstore::Error::ConnectionClosed
            | eventstore::Error::Grpc { .. }
            | eventstore::Error::GrpcConnectionError(_)
            | eventstore::Error::DeadlineExceeded
            | eventstore::Error::InitializationError(_) => Self::ConnectionError(Box::new(value)),
            eventstore::Error::ServerError(_)
            | eventstore::Error::NotLeaderException(_)
            | eventstore::Error::AccessDenied
            | eventstore::Error::UnsupportedFeature
            | eventstore::Error::InternalParsingError(_)
            | eventstore::Error::InternalClientError => Self::QueryError(Box::new(value)),
            eventstore::Error::ResourceNotFound | eventstore::Error::ResourceDeleted => {
                Self::ReadError(Box::new(value))
            }
            eventstore::Error::WrongExpectedVersion { .. } => Self::Conflict(value.to_string()),
            eventstore::Error::ResourceAlreadyExists => Self::WriteError(Box::new(value)),
            eventstore::Error::IllegalStateError(_) => Self::ClientSideError(Box::new(value)),
        }
    }
}

impl From<EventConvertError> for DataAccessError {
    fn from(value: EventConvertError) -> Self {
        DataAccessError::ClientSideError(Box::new(value))
    }
}

#[derive(Error, Debug)]
#[error("Failed to convert event")]
pub struct EventConvertError;

impl From<serde_json::Error> for EventConvertError {
    fn from(_value: serde_json::Error) -> Self {
        EventConvertError
    }
}

fn entity_id<I, T>(stream_id: &str) -> Option<I>
where
    I: Id<Inner = T>,
    T: FromStr,
{
    stream_id
        .split('-')
        .filter_map(|s| s.parse::<T>().ok())
        .map(I::from)
        .last()
}

pub(crate) fn stream_name<E: Entity>(id: E::Id) -> String {
    format!("{}-{}", E::ENTITY_NAME, id)
}

/// `{"Type": {"id": .., ..}}` をイベント種別と `id` を除いた本体に分ける
fn encode<E: Event>(event: &E) -> Result<(String, Value), EventConvertError> {
    let (event_type, mut data) = match serde_json::to_value(event)? {
        Value::Object(root) => root.into_iter().next().ok_or(EventConvertError)?,
        _ => return Err(EventConvertError),
    };
    data.as_object_mut().ok_or(EventConvertError)?.remove("id");
    Ok((event_type, data))
}

/// `encode` の逆。`id` はストリーム名から復元する。
fn decode<E, I>(stream_id: &str, event_type: &str, data: &[u8]) -> Result<E, EventConvertError>
where
    E: DeserializeOwned + Event<Id = I>,
    I: Id,
{
    let id = entity_id::<I, I::Inner>(stream_id).ok_or(EventConvertError)?;
    let mut data: Map<String, Value> = serde_json::from_slice(data)?;
    data.insert("id".to_owned(), json!(id));
    Ok(serde_json::from_value(json!({ event_type: data }))?)
}

fn from_event<E: Event>(event: &E) -> Result<EventData, EventConvertError> {
    let (event_type, data) = encode(event)?;
    Ok(EventData::json(event_type, data)?)
}

fn try_from_resolved_event<E, I>(value: &ResolvedEvent) -> Result<E, EventConvertError>
where
    E: DeserializeOwned + Event<Id = I>,
    I: Id,
{
    let event = value.get_original_event();
    decode(&event.stream_id, &event.event_type, event.data.as_ref())
}

/// イベントから作られる索引
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum IndexEntry {
    Reservation {
        id: ReservationId,
        user_id: UserId,
    },
    Payment {
        id: PaymentId,
        user_id: UserId,
    },
}

impl IndexEntry {
    pub(crate) fn user_id(&self) -> &UserId {
        match self {
            IndexEntry::Reservation { user_id, .. } | IndexEntry::Payment { user_id, .. } => {
                user_id
            }
        }
    }
}

pub(crate) fn index_entries<'a, I>(events: I) -> Vec<IndexEntry>
where
    I: IntoIterator<Item = &'a SpotEvent>,
{
    events
        .into_iter()
        .filter_map(|event| match event {
            SpotEvent::ReservationCreated { reservation, .. } => Some(IndexEntry::Reservation {
                id: reservation.id(),
                user_id: reservation.user_id().clone(),
            }),
            SpotEvent::PaymentCreated { payment, .. } => Some(IndexEntry::Payment {
                id: payment.id(),
                user_id: payment.payer().clone(),
            }),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::parking::{ParkingSpot, SpotId};

    #[test]
    fn test_stream_name() {
        assert_eq!(
            stream_name::<ParkingSpot>(SpotId::from(463543)),
            "spot-463543"
        );
        assert_eq!(entity_id::<SpotId, u64>("spot-463543"), Some(463543.into()));
        assert_eq!(entity_id::<SpotId, u64>("spot"), None);
    }

    #[test]
    fn test_encode_strips_id() {
        let (event_type, data) = encode(&SpotEvent::SpotOccupied { id: 463543.into() }).unwrap();
        assert_eq!(event_type, "SpotOccupied");
        assert_eq!(data, json!({}));
    }

    #[test]
    fn test_decode_restores_id() {
        let event: SpotEvent = decode("spot-463543", "SpotReservable", b"{}").unwrap();
        assert_eq!(event, SpotEvent::SpotReservable { id: 463543.into() });
        assert!(decode::<SpotEvent, SpotId>("spot-463543", "Unknown", b"{}").is_err());
        assert!(decode::<SpotEvent, SpotId>("spot-463543", "SpotFreed", b"[]").is_err());
    }
}
