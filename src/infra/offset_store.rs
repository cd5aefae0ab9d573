use rusqlite::{params, Connection};
use std::path::Path;
use std::time::Duration;

use crate::error::Result;

/// Committed stream positions, one row per (consumer, stream).
pub struct OffsetStore {
    conn: Connection,
}

impl OffsetStore {
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
        // Every stream of a run commits into the same file
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS consumer_offsets (
                consumer       TEXT NOT NULL,
                stream         TEXT NOT NULL,
                next_sequence  INTEGER NOT NULL,
                PRIMARY KEY (consumer, stream)
            );
            "#,
        )?;
        Ok(Self { conn })
    }

    /// Sequence of the first record not yet processed (0 when never committed).
    pub fn next_sequence(&self, consumer: &str, stream: &str) -> Result<u64> {
        let mut stmt = self
            .conn
            .prepare("SELECT next_sequence FROM consumer_offsets WHERE consumer = ?1 AND stream = ?2")?;
        let mut rows = stmt.query(params![consumer, stream])?;
        if let Some(row) = rows.next()? {
            let next: i64 = row.get(0)?;
            Ok(next.max(0) as u64)
        } else {
            Ok(0)
        }
    }

    pub fn commit(&self, consumer: &str, stream: &str, next_sequence: u64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO consumer_offsets (consumer, stream, next_sequence) VALUES (?1, ?2, ?3)
             ON CONFLICT(consumer, stream) DO UPDATE SET next_sequence=excluded.next_sequence",
            params![consumer, stream, next_sequence as i64],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncommitted_stream_starts_at_zero() {
        let store = OffsetStore::open_in_memory().unwrap();
        assert_eq!(store.next_sequence("ingest", "bikes.log").unwrap(), 0);
    }

    #[test]
    fn commits_overwrite_and_are_scoped_per_consumer() {
        let store = OffsetStore::open_in_memory().unwrap();
        store.commit("a", "bikes.log", 3).unwrap();
        store.commit("a", "bikes.log", 9).unwrap();
        store.commit("b", "bikes.log", 1).unwrap();
        assert_eq!(store.next_sequence("a", "bikes.log").unwrap(), 9);
        assert_eq!(store.next_sequence("b", "bikes.log").unwrap(), 1);
        assert_eq!(store.next_sequence("a", "other.log").unwrap(), 0);
    }

    #[test]
    fn offsets_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("offsets.db");
        OffsetStore::open(&path).unwrap().commit("a", "s", 5).unwrap();
        assert_eq!(OffsetStore::open(&path).unwrap().next_sequence("a", "s").unwrap(), 5);
    }
}
