use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::app::ports::StagingStore;
use crate::constants::STAGING_COLLABORATOR;
use crate::domain::{MetricsRecord, RideLink, RiderProfile};
use crate::error::{IngestError, Result};

#[derive(Default)]
struct Tables {
    riders: HashMap<i64, RiderProfile>,
    links: HashMap<Uuid, RideLink>,
    metrics: Vec<MetricsRecord>,
}

/// In-memory staging store for development/testing, with the same
/// idempotency rules as the SQLite store.
#[derive(Clone, Default)]
pub struct InMemoryStagingStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStagingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| IngestError::collaborator(STAGING_COLLABORATOR, "staging tables poisoned"))
    }

    pub fn riders(&self) -> Vec<RiderProfile> {
        self.tables()
            .map(|t| t.riders.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn links(&self) -> Vec<RideLink> {
        self.tables()
            .map(|t| t.links.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Metrics rows in insertion order.
    pub fn metrics(&self) -> Vec<MetricsRecord> {
        self.tables().map(|t| t.metrics.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl StagingStore for InMemoryStagingStore {
    async fn upsert_rider(&self, rider: &RiderProfile) -> Result<()> {
        self.tables()?.riders.insert(rider.rider_id, rider.clone());
        debug!(rider_id = rider.rider_id, "Upserted rider");
        Ok(())
    }

    async fn link_ride_to_rider(&self, link: &RideLink) -> Result<()> {
        self.tables()?.links.entry(link.ride_id).or_insert_with(|| link.clone());
        Ok(())
    }

    async fn insert_metrics(&self, metrics: &MetricsRecord) -> Result<()> {
        let mut tables = self.tables()?;
        let duplicate = tables
            .metrics
            .iter()
            .any(|m| m.ride_id == metrics.ride_id && m.recorded_at == metrics.recorded_at);
        if !duplicate {
            tables.metrics.push(metrics.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn replayed_writes_keep_one_row() {
        let store = InMemoryStagingStore::new();
        let at = NaiveDate::from_ymd_opt(2024, 10, 1).unwrap().and_hms_opt(9, 0, 0).unwrap();
        let rider = RiderProfile {
            rider_id: 1,
            first_name: "A".into(),
            last_name: "B".into(),
            gender: "male".into(),
            postcode: None,
            date_of_birth: at,
            email: "a@b.c".into(),
            height_cm: 180.0,
            weight_kg: 80.0,
            account_created: at,
        };
        let link = RideLink { rider_id: 1, ride_id: Uuid::new_v4() };
        let metrics = MetricsRecord {
            ride_id: link.ride_id,
            recorded_at: at,
            bike_model: "X v2".into(),
            duration_secs: 1.0,
            resistance: 1,
            heart_rate: 0,
            rpm: 0,
            power: 0.0,
        };

        for _ in 0..2 {
            store.upsert_rider(&rider).await.unwrap();
            store.link_ride_to_rider(&link).await.unwrap();
            store.insert_metrics(&metrics).await.unwrap();
        }

        assert_eq!(store.riders().len(), 1);
        assert_eq!(store.links(), vec![link]);
        assert_eq!(store.metrics().len(), 1);
    }
}
