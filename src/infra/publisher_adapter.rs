//! Ride-completion notification publishing.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::app::ports::{CompletionNotice, EventPublisher};
use crate::constants::PUBLISHER_COLLABORATOR;
use crate::error::{IngestError, Result};

#[derive(Serialize)]
struct PublishRequest<'a> {
    topic: &'a str,
    #[serde(flatten)]
    notice: &'a CompletionNotice,
}

/// Publishes notices as JSON to an HTTP topic endpoint and returns the
/// endpoint's `message_id`.
pub struct HttpEventPublisher {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpEventPublisher {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl EventPublisher for HttpEventPublisher {
    async fn publish(&self, topic: &str, payload: &CompletionNotice) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&PublishRequest { topic, notice: payload })
            .send()
            .await?
            .error_for_status()?;

        let body = response.text().await?;
        message_id_from(&body)
    }
}

/// A publish only counts once the endpoint has acknowledged it with an id.
fn message_id_from(body: &str) -> Result<String> {
    let value: serde_json::Value = serde_json::from_str(body).map_err(|e| {
        IngestError::collaborator(PUBLISHER_COLLABORATOR, format!("unreadable publish response: {}", e))
    })?;
    match value.get("message_id").and_then(|id| id.as_str()) {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err(IngestError::collaborator(
            PUBLISHER_COLLABORATOR,
            "publish response carried no message_id",
        )),
    }
}

/// Logs notices instead of publishing them; for local runs.
#[derive(Default)]
pub struct LogEventPublisher;

#[async_trait]
impl EventPublisher for LogEventPublisher {
    async fn publish(&self, topic: &str, payload: &CompletionNotice) -> Result<String> {
        let message_id = Uuid::new_v4().to_string();
        info!(
            topic,
            ride_id = %payload.ride_id,
            subject = %payload.subject,
            message_id = %message_id,
            "Ride completion notice (log only)"
        );
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notice() -> CompletionNotice {
        CompletionNotice {
            ride_id: Uuid::new_v4(),
            rider_id: 42,
            subject: "production script".into(),
            message: "start new ride".into(),
        }
    }

    #[test]
    fn request_body_flattens_notice() {
        let n = notice();
        let body = serde_json::to_value(PublishRequest { topic: "rides", notice: &n }).unwrap();
        assert_eq!(body["topic"], "rides");
        assert_eq!(body["rider_id"], 42);
        assert_eq!(body["message"], "start new ride");
    }

    #[test]
    fn message_id_comes_from_the_response() {
        assert_eq!(message_id_from(r#"{"message_id": "m-17"}"#).unwrap(), "m-17");
    }

    #[test]
    fn response_without_message_id_is_a_collaborator_error() {
        for body in [r#"{"status": "ok"}"#, r#"{"message_id": ""}"#, "accepted"] {
            let err = message_id_from(body).unwrap_err();
            assert!(matches!(err, IngestError::Collaborator { .. }), "body {body}");
        }
    }

    #[tokio::test]
    async fn log_publisher_returns_message_id() {
        let id = LogEventPublisher.publish("rides", &notice()).await.unwrap();
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error() {
        let publisher = HttpEventPublisher::new("http://127.0.0.1:9/publish", Duration::from_millis(200)).unwrap();
        let err = publisher.publish("rides", &notice()).await.unwrap_err();
        assert!(matches!(err, IngestError::Http(_)));
    }
}
