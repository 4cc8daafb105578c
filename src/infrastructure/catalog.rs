use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use crate::domain::{
    parking::{Currency, Money, SpotCatalog, SpotId, SpotListing},
    DataAccessError,
};

/// 市のオープンデータから書き出した駐車スペース
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogRecord {
    parking_spot_id: String,
    name: String,
    #[serde(default)]
    address: String,
    price_per_hour: f64,
    max_duration: u32,
    #[serde(default = "default_flag")]
    is_available: bool,
    #[serde(default = "default_flag")]
    can_reserve: bool,
}

fn default_flag() -> bool {
    true
}

impl CatalogRecord {
    fn into_listing(self) -> Option<SpotListing> {
        let id = match self.parking_spot_id.parse::<SpotId>() {
            Ok(id) => id,
            Err(_) => {
                warn!("標識番号が不正な駐車スペースをスキップしました: {}", self.parking_spot_id);
                return None;
            }
        };
        Some(SpotListing {
            id,
            name: self.name,
            address: self.address,
            price_per_hour: Money::from_major(self.price_per_hour, Currency::CAD),
            max_duration_minutes: self.max_duration,
            is_available: self.is_available,
            can_reserve: self.can_reserve,
        })
    }
}

/// JSONファイルの駐車スペースカタログ
#[derive(Clone, Debug)]
pub struct JsonFileSpotCatalog {
    path: PathBuf,
}

impl JsonFileSpotCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn parse(bytes: &[u8]) -> Result<Vec<SpotListing>, DataAccessError> {
        let records: Vec<CatalogRecord> =
            serde_json::from_slice(bytes).map_err(|e| DataAccessError::ReadError(Box::new(e)))?;
        Ok(records
            .into_iter()
            .filter_map(CatalogRecord::into_listing)
            .collect())
    }
}

#[async_trait]
impl SpotCatalog for JsonFileSpotCatalog {
    async fn fetch(&self) -> Result<Vec<SpotListing>, DataAccessError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| DataAccessError::ReadError(Box::new(e)))?;
        Self::parse(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{application::import_spots, infrastructure::memory::MemoryParkingSpotRepository};
    use crate::domain::parking::ParkingSpotRepository;

    const CATALOG: &str = r#"[
        {
            "parkingSpotId": "463543",
            "name": "Place 463543",
            "address": "Rue A, Montréal",
            "pricePerHour": 3.5,
            "maxDuration": 120,
            "isAvailable": true,
            "canReserve": true
        },
        {
            "parkingSpotId": "mtl-12",
            "name": "Place de stationnement - Montréal",
            "pricePerHour": 3.5,
            "maxDuration": 120
        },
        {
            "parkingSpotId": "472191",
            "name": "Place 472191",
            "pricePerHour": 2.25,
            "maxDuration": 60
        }
    ]"#;

    struct StaticCatalog(Vec<SpotListing>);

    #[async_trait]
    impl SpotCatalog for StaticCatalog {
        async fn fetch(&self) -> Result<Vec<SpotListing>, DataAccessError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_parse_catalog() {
        let listings = JsonFileSpotCatalog::parse(CATALOG.as_bytes()).unwrap();
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].id, SpotId::from(463543));
        assert_eq!(listings[0].price_per_hour, Money::new(350, Currency::CAD));
        assert_eq!(listings[1].address, "");
        assert_eq!(listings[1].max_duration_minutes, 60);
        assert!(listings[1].is_available);
        assert!(listings[1].can_reserve);
    }

    #[test]
    fn test_parse_rejects_malformed_file() {
        assert!(matches!(
            JsonFileSpotCatalog::parse(b"{}"),
            Err(DataAccessError::ReadError(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let catalog = JsonFileSpotCatalog::new("does-not-exist.json");
        assert!(catalog.fetch().await.is_err());
    }

    #[tokio::test]
    async fn test_import_skips_out_of_range_prices() {
        const PRICES: &str = r#"[
            { "parkingSpotId": "1", "name": "Place 1", "pricePerHour": -3.5, "maxDuration": 120 },
            { "parkingSpotId": "2", "name": "Place 2", "pricePerHour": 1e17, "maxDuration": 120 },
            { "parkingSpotId": "3", "name": "Place 3", "pricePerHour": 3.5, "maxDuration": 120 }
        ]"#;
        let catalog = StaticCatalog(JsonFileSpotCatalog::parse(PRICES.as_bytes()).unwrap());
        let repository = MemoryParkingSpotRepository::new();

        assert_eq!(import_spots(&catalog, &repository).await.unwrap(), 1);
        assert_eq!(repository.find_by_id(1.into()).await.unwrap(), None);
        assert_eq!(repository.find_by_id(2.into()).await.unwrap(), None);
        assert!(repository.find_by_id(3.into()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_import_skips_known_and_invalid_spots() {
        let mut listings = JsonFileSpotCatalog::parse(CATALOG.as_bytes()).unwrap();
        let mut invalid = listings[0].clone();
        invalid.id = 1.into();
        invalid.max_duration_minutes = 0;
        listings.push(invalid);
        let catalog = StaticCatalog(listings);
        let repository = MemoryParkingSpotRepository::new();

        assert_eq!(import_spots(&catalog, &repository).await.unwrap(), 2);
        assert_eq!(import_spots(&catalog, &repository).await.unwrap(), 0);
        assert_eq!(repository.find_all().await.unwrap().len(), 2);
        assert_eq!(repository.find_by_id(1.into()).await.unwrap(), None);
    }
}
