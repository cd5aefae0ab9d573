//! SQLite-backed staging store.
//!
//! Writes run on the blocking pool so the loop's collaborator timeout can
//! actually bound them.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection};

use crate::app::ports::StagingStore;
use crate::constants::STAGING_COLLABORATOR;
use crate::domain::{MetricsRecord, RideLink, RiderProfile};
use crate::error::{IngestError, Result};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const SCHEMA: &str = r#"
    PRAGMA journal_mode=WAL;
    CREATE TABLE IF NOT EXISTS user_table (
        user_id           INTEGER PRIMARY KEY,
        first_name        TEXT NOT NULL,
        last_name         TEXT NOT NULL,
        gender            TEXT NOT NULL,
        postcode          TEXT,
        date_of_birth     TEXT NOT NULL,
        email             TEXT NOT NULL,
        height_cm         REAL NOT NULL,
        weight_kg         REAL NOT NULL,
        account_creation  TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS user_ride (
        ride_id  TEXT PRIMARY KEY,
        user_id  INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS metrics_table (
        ride_id           TEXT NOT NULL,
        time              TEXT NOT NULL,
        bike_model        TEXT NOT NULL,
        duration_seconds  REAL NOT NULL,
        resistance        INTEGER NOT NULL,
        heart_rate        INTEGER NOT NULL,
        rpm               INTEGER NOT NULL,
        power             REAL NOT NULL,
        PRIMARY KEY (ride_id, time)
    );
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagingTable {
    Riders,
    RideLinks,
    Metrics,
}

impl StagingTable {
    fn name(self) -> &'static str {
        match self {
            StagingTable::Riders => "user_table",
            StagingTable::RideLinks => "user_ride",
            StagingTable::Metrics => "metrics_table",
        }
    }
}

#[derive(Clone)]
pub struct SqliteStagingStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStagingStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(db_path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn count(&self, table: StagingTable) -> Result<i64> {
        let conn = self.lock()?;
        let sql = format!("SELECT COUNT(*) FROM {}", table.name());
        Ok(conn.query_row(&sql, [], |row| row.get(0))?)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| IngestError::collaborator(STAGING_COLLABORATOR, "connection mutex poisoned"))
    }

    async fn write<F>(&self, op: F) -> Result<()>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<usize> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| IngestError::collaborator(STAGING_COLLABORATOR, "connection mutex poisoned"))?;
            op(&*guard)?;
            Ok::<(), IngestError>(())
        })
        .await
        .map_err(|e| IngestError::collaborator(STAGING_COLLABORATOR, e))?
    }
}

#[async_trait]
impl StagingStore for SqliteStagingStore {
    async fn upsert_rider(&self, rider: &RiderProfile) -> Result<()> {
        let r = rider.clone();
        self.write(move |conn| {
            conn.execute(
                "INSERT INTO user_table
                 (user_id, first_name, last_name, gender, postcode, date_of_birth, email, height_cm, weight_kg, account_creation)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(user_id) DO UPDATE SET
                    first_name=excluded.first_name, last_name=excluded.last_name, gender=excluded.gender,
                    postcode=excluded.postcode, date_of_birth=excluded.date_of_birth, email=excluded.email,
                    height_cm=excluded.height_cm, weight_kg=excluded.weight_kg,
                    account_creation=excluded.account_creation",
                params![
                    r.rider_id,
                    r.first_name,
                    r.last_name,
                    r.gender,
                    r.postcode,
                    r.date_of_birth.format(TIMESTAMP_FORMAT).to_string(),
                    r.email,
                    r.height_cm,
                    r.weight_kg,
                    r.account_created.format(TIMESTAMP_FORMAT).to_string(),
                ],
            )
        })
        .await
    }

    async fn link_ride_to_rider(&self, link: &RideLink) -> Result<()> {
        let ride_id = link.ride_id.to_string();
        let rider_id = link.rider_id;
        self.write(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO user_ride (ride_id, user_id) VALUES (?1, ?2)",
                params![ride_id, rider_id],
            )
        })
        .await
    }

    async fn insert_metrics(&self, metrics: &MetricsRecord) -> Result<()> {
        let m = metrics.clone();
        self.write(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO metrics_table
                 (ride_id, time, bike_model, duration_seconds, resistance, heart_rate, rpm, power)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    m.ride_id.to_string(),
                    m.recorded_at.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
                    m.bike_model,
                    m.duration_secs,
                    m.resistance,
                    m.heart_rate,
                    m.rpm,
                    m.power,
                ],
            )
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn rider(email: &str) -> RiderProfile {
        let dob = NaiveDate::from_ymd_opt(2000, 6, 15).unwrap().and_hms_opt(0, 0, 0).unwrap();
        RiderProfile {
            rider_id: 42,
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            gender: "female".into(),
            postcode: Some("N7 6LP".into()),
            date_of_birth: dob,
            email: email.into(),
            height_cm: 170.0,
            weight_kg: 61.0,
            account_created: dob,
        }
    }

    fn metrics(ride_id: Uuid, second: u32) -> MetricsRecord {
        MetricsRecord {
            ride_id,
            recorded_at: NaiveDate::from_ymd_opt(2024, 10, 1).unwrap().and_hms_opt(9, 0, second).unwrap(),
            bike_model: "X v2".into(),
            duration_secs: 300.0,
            resistance: 5,
            heart_rate: 110,
            rpm: 80,
            power: 150.0,
        }
    }

    #[tokio::test]
    async fn rider_upsert_is_idempotent_and_updates() {
        let store = SqliteStagingStore::open_in_memory().unwrap();
        store.upsert_rider(&rider("old@example.com")).await.unwrap();
        store.upsert_rider(&rider("new@example.com")).await.unwrap();
        assert_eq!(store.count(StagingTable::Riders).unwrap(), 1);

        let conn = store.lock().unwrap();
        let email: String = conn
            .query_row("SELECT email FROM user_table WHERE user_id = 42", [], |r| r.get(0))
            .unwrap();
        assert_eq!(email, "new@example.com");
    }

    #[tokio::test]
    async fn links_and_metrics_ignore_replays() {
        let store = SqliteStagingStore::open_in_memory().unwrap();
        let ride_id = Uuid::new_v4();
        let link = RideLink { rider_id: 42, ride_id };
        store.link_ride_to_rider(&link).await.unwrap();
        store.link_ride_to_rider(&link).await.unwrap();
        store.insert_metrics(&metrics(ride_id, 0)).await.unwrap();
        store.insert_metrics(&metrics(ride_id, 0)).await.unwrap();
        store.insert_metrics(&metrics(ride_id, 1)).await.unwrap();

        assert_eq!(store.count(StagingTable::RideLinks).unwrap(), 1);
        assert_eq!(store.count(StagingTable::Metrics).unwrap(), 2);
    }

    #[tokio::test]
    async fn file_database_persists_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("staging").join("staging.db");
        SqliteStagingStore::open(&path)
            .unwrap()
            .upsert_rider(&rider("a@example.com"))
            .await
            .unwrap();
        let reopened = SqliteStagingStore::open(&path).unwrap();
        assert_eq!(reopened.count(StagingTable::Riders).unwrap(), 1);
    }
}
