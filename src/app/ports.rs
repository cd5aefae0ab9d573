use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{MetricsRecord, RawRecord, RideLink, RiderProfile};
use crate::error::Result;

/// Outcome of one poll against a stream source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamPoll {
    Record(RawRecord),
    /// Nothing available yet; poll again.
    Empty,
    /// A finite source has been fully read.
    EndOfStream,
}

/// Ordered, at-least-once source of raw log records for one partition.
///
/// Errors are `IngestError::Stream` when the poll can simply be retried and
/// `IngestError::Transport` when the connection is unusable.
#[async_trait]
pub trait StreamSource: Send {
    fn name(&self) -> &str;
    async fn poll(&mut self) -> Result<StreamPoll>;
    /// Marks every record up to and including `sequence` as processed.
    async fn commit(&mut self, sequence: u64) -> Result<()>;
    async fn close(&mut self) -> Result<()>;
}

/// Durable staging rows. Every write is idempotent on its natural key.
#[async_trait]
pub trait StagingStore: Send + Sync {
    async fn upsert_rider(&self, rider: &RiderProfile) -> Result<()>;
    async fn link_ride_to_rider(&self, link: &RideLink) -> Result<()>;
    async fn insert_metrics(&self, metrics: &MetricsRecord) -> Result<()>;
}

#[async_trait]
pub trait AlertChannel: Send + Sync {
    /// Returns whether the alert was accepted for delivery.
    async fn send_heart_rate_alert(&self, rider_name: &str, rider_email: &str, heart_rate: u32) -> bool;
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Returns the transport's message id.
    async fn publish(&self, topic: &str, payload: &CompletionNotice) -> Result<String>;
}

/// Announces that a ride's staging rows are ready for the downstream transform.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CompletionNotice {
    pub ride_id: Uuid,
    pub rider_id: i64,
    pub subject: String,
    pub message: String,
}
