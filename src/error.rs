use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    /// A marker matched but a required field could not be extracted.
    #[error("Malformed {marker} record: {reason}")]
    MalformedRecord { marker: &'static str, reason: String },

    #[error("Pairing anomaly: {0}")]
    PairingAnomaly(String),

    #[error("{collaborator} call failed: {message}")]
    Collaborator {
        collaborator: &'static str,
        message: String,
    },

    #[error("{collaborator} call timed out after {after_ms}ms")]
    Timeout {
        collaborator: &'static str,
        after_ms: u64,
    },

    /// Poll failed but the connection is still usable.
    #[error("Stream error: {0}")]
    Stream(String),

    /// The stream connection itself is unusable.
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl IngestError {
    pub fn malformed(marker: &'static str, reason: impl Into<String>) -> Self {
        IngestError::MalformedRecord {
            marker,
            reason: reason.into(),
        }
    }

    pub fn collaborator(collaborator: &'static str, message: impl ToString) -> Self {
        IngestError::Collaborator {
            collaborator,
            message: message.to_string(),
        }
    }

    /// Only a transport failure ends an ingestion loop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, IngestError::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_failures_are_fatal() {
        assert!(IngestError::Transport("broker gone".into()).is_fatal());
        assert!(!IngestError::Stream("partition rebalancing".into()).is_fatal());
        assert!(!IngestError::malformed("telemetry", "missing hrt").is_fatal());
        assert!(!IngestError::collaborator("staging", "locked").is_fatal());
    }

    #[test]
    fn malformed_message_names_marker() {
        let err = IngestError::malformed("ride", "missing resistance");
        assert_eq!(err.to_string(), "Malformed ride record: missing resistance");
    }
}
