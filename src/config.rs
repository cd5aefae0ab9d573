use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
    DEFAULT_ALERT_SENDER, DEFAULT_COLLABORATOR_TIMEOUT_MS, DEFAULT_CONSUMER, DEFAULT_IDLE_POLL_MS, DEFAULT_LOG_DIR,
    DEFAULT_NOTIFY_TOPIC, DEFAULT_OFFSETS_DB, DEFAULT_STAGING_DB, COMPLETION_SUBJECT,
};
use crate::error::{IngestError, Result};

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub stream: StreamConfig,
    pub staging: StagingConfig,
    pub alerts: AlertConfig,
    pub notifications: NotificationConfig,
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub consumer: String,
    pub follow: bool,
    pub idle_poll_ms: u64,
    pub offsets_db: PathBuf,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            consumer: DEFAULT_CONSUMER.to_string(),
            follow: false,
            idle_poll_ms: DEFAULT_IDLE_POLL_MS,
            offsets_db: PathBuf::from(DEFAULT_OFFSETS_DB),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    pub db_path: PathBuf,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_STAGING_DB),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub sender_address: String,
    /// Mail API endpoint; alerts are only logged when unset.
    pub endpoint: Option<String>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            sender_address: DEFAULT_ALERT_SENDER.to_string(),
            endpoint: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub topic: String,
    pub subject: String,
    /// Publish endpoint; notices are only logged when unset.
    pub endpoint: Option<String>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            topic: DEFAULT_NOTIFY_TOPIC.to_string(),
            subject: COMPLETION_SUBJECT.to_string(),
            endpoint: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub collaborator_timeout_ms: u64,
    pub log_dir: PathBuf,
    /// Prometheus listen address, e.g. "127.0.0.1:9898".
    pub metrics_addr: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            collaborator_timeout_ms: DEFAULT_COLLABORATOR_TIMEOUT_MS,
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            metrics_addr: None,
        }
    }
}

impl Config {
    /// Reads `path` when given (or `config.toml` when present), then applies
    /// environment overrides and validates.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let default_path = Path::new("config.toml");
        let config_path = match path {
            Some(p) => Some(p),
            None if default_path.exists() => Some(default_path),
            None => None,
        };

        let mut config = match config_path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            IngestError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Overrides fields from `RIDE_INGEST_*` variables.
    pub fn apply_env<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = var("RIDE_INGEST_STAGING_DB") {
            self.staging.db_path = PathBuf::from(v);
        }
        if let Some(v) = var("RIDE_INGEST_OFFSETS_DB") {
            self.stream.offsets_db = PathBuf::from(v);
        }
        if let Some(v) = var("RIDE_INGEST_CONSUMER") {
            self.stream.consumer = v;
        }
        if let Some(v) = var("RIDE_INGEST_ALERT_SENDER") {
            self.alerts.sender_address = v;
        }
        if let Some(v) = var("RIDE_INGEST_ALERT_ENDPOINT") {
            self.alerts.endpoint = Some(v);
        }
        if let Some(v) = var("RIDE_INGEST_NOTIFY_TOPIC") {
            self.notifications.topic = v;
        }
        if let Some(v) = var("RIDE_INGEST_NOTIFY_ENDPOINT") {
            self.notifications.endpoint = Some(v);
        }
        if let Some(v) = var("RIDE_INGEST_COLLABORATOR_TIMEOUT_MS") {
            self.runtime.collaborator_timeout_ms = v.parse().map_err(|e| {
                IngestError::Config(format!("RIDE_INGEST_COLLABORATOR_TIMEOUT_MS '{}': {}", v, e))
            })?;
        }
        if let Some(v) = var("RIDE_INGEST_LOG_DIR") {
            self.runtime.log_dir = PathBuf::from(v);
        }
        if let Some(v) = var("RIDE_INGEST_METRICS_ADDR") {
            self.runtime.metrics_addr = Some(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.runtime.collaborator_timeout_ms == 0 {
            return Err(IngestError::Config("collaborator_timeout_ms must be greater than zero".into()));
        }
        if self.stream.idle_poll_ms == 0 {
            return Err(IngestError::Config("idle_poll_ms must be greater than zero".into()));
        }
        if self.notifications.topic.trim().is_empty() {
            return Err(IngestError::Config("notification topic must not be empty".into()));
        }
        if self.alerts.sender_address.trim().is_empty() {
            return Err(IngestError::Config("alert sender address must not be empty".into()));
        }
        if let Some(addr) = &self.runtime.metrics_addr {
            addr.parse::<std::net::SocketAddr>()
                .map_err(|e| IngestError::Config(format!("metrics_addr '{}': {}", addr, e)))?;
        }
        Ok(())
    }

    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.runtime.collaborator_timeout_ms)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.stream.idle_poll_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [notifications]
            topic = "rides-done"

            [runtime]
            collaborator_timeout_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.notifications.topic, "rides-done");
        assert_eq!(config.notifications.subject, "production script");
        assert_eq!(config.collaborator_timeout(), Duration::from_millis(250));
        assert_eq!(config.stream.consumer, "ride-ingest");
        assert!(config.alerts.endpoint.is_none());
    }

    #[test]
    fn env_overrides_win() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("RIDE_INGEST_NOTIFY_TOPIC", "other"),
            ("RIDE_INGEST_COLLABORATOR_TIMEOUT_MS", "42"),
            ("RIDE_INGEST_ALERT_ENDPOINT", "http://mail.local/send"),
        ]);
        let mut config = Config::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.notifications.topic, "other");
        assert_eq!(config.runtime.collaborator_timeout_ms, 42);
        assert_eq!(config.alerts.endpoint.as_deref(), Some("http://mail.local/send"));
    }

    #[test]
    fn bad_timeout_override_is_config_error() {
        let mut config = Config::default();
        let err = config
            .apply_env(|k| (k == "RIDE_INGEST_COLLABORATOR_TIMEOUT_MS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, IngestError::Config(_)));
    }

    #[test]
    fn validation_rejects_zero_timeout_and_empty_topic() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());
        config.runtime.collaborator_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.notifications.topic = " ".into();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.runtime.metrics_addr = Some("not-an-addr".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_idle_poll_is_rejected() {
        let config: Config = toml::from_str("[stream]\nfollow = true\nidle_poll_ms = 0\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, IngestError::Config(ref m) if m.contains("idle_poll_ms")));
    }

    #[test]
    fn load_reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ingest.toml");
        std::fs::write(&path, "[stream]\nfollow = true\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert!(config.stream.follow);
    }
}
