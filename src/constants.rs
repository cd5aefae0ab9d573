/// Marker substrings recognised in raw bike log lines.
/// Checked in this order; the first match decides the event kind.
pub const RIDE_START_MARKER: &str = "beginning of a new ride";
pub const RIDE_END_MARKER: &str = "beginning of main";
pub const SYSTEM_MARKER: &str = "[SYSTEM]";
pub const TELEMETRY_MARKER: &str = "Telemetry";
pub const RIDE_MARKER: &str = "Ride";

/// Field name carrying the log line inside a JSON stream message.
pub const WIRE_LOG_FIELD: &str = "log";

// Completion notification sent once per finished ride
pub const DEFAULT_NOTIFY_TOPIC: &str = "ride-completed";
pub const COMPLETION_MESSAGE: &str = "start new ride";
pub const COMPLETION_SUBJECT: &str = "production script";

pub const ALERT_SUBJECT: &str = "HEART RATE ALERT";
pub const DEFAULT_ALERT_SENDER: &str = "alerts@localhost";

pub const DEFAULT_CONSUMER: &str = "ride-ingest";
pub const DEFAULT_STAGING_DB: &str = "data/staging.db";
pub const DEFAULT_OFFSETS_DB: &str = "data/offsets.db";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_COLLABORATOR_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_IDLE_POLL_MS: u64 = 500;

/// Names used for collaborator-labelled logs and metrics
pub const STAGING_COLLABORATOR: &str = "staging";
pub const ALERT_COLLABORATOR: &str = "alert";
pub const PUBLISHER_COLLABORATOR: &str = "publisher";
