//! Heart-rate alert delivery.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info};

use crate::app::ports::AlertChannel;
use crate::constants::ALERT_SUBJECT;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Builds the rider-facing alert email.
pub fn compose_heart_rate_alert(sender: &str, rider_name: &str, rider_email: &str, heart_rate: u32) -> AlertEmail {
    let html = format!(
        r#"<html>
    <h2 style="text-align: center;"><span style="color: #ff0000;">Heart rate alert!</span></h2>
    <p>Dear {name},</p>
    <p><strong>Whilst riding your bike, your heart rate was recorded as: <span style="color: #ff0000;">{bpm} bpm</span></strong></p>
    <p>This is outside the safe range we have calculated for your age.</p>
    <p>If you start to feel unwell, call the emergency services.</p>
    <p>From the Customer Alerts Team.</p>
</html>"#,
        name = rider_name,
        bpm = heart_rate,
    );
    AlertEmail {
        from: sender.to_string(),
        to: rider_email.to_string(),
        subject: ALERT_SUBJECT.to_string(),
        html,
    }
}

/// Posts alert emails as JSON to a transactional mail HTTP endpoint.
pub struct HttpAlertChannel {
    client: reqwest::Client,
    endpoint: String,
    sender: String,
}

impl HttpAlertChannel {
    pub fn new(endpoint: impl Into<String>, sender: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            sender: sender.into(),
        })
    }
}

#[async_trait]
impl AlertChannel for HttpAlertChannel {
    async fn send_heart_rate_alert(&self, rider_name: &str, rider_email: &str, heart_rate: u32) -> bool {
        let email = compose_heart_rate_alert(&self.sender, rider_name, rider_email, heart_rate);
        let response = self.client.post(&self.endpoint).json(&email).send().await;
        match response.and_then(|r| r.error_for_status()) {
            Ok(_) => true,
            Err(e) => {
                error!(from = %self.sender, to = %rider_email, error = %e, "Failed to send heart rate alert");
                false
            }
        }
    }
}

/// Logs alerts instead of sending them; for local runs.
pub struct LogAlertChannel {
    sender: String,
}

impl LogAlertChannel {
    pub fn new(sender: impl Into<String>) -> Self {
        Self { sender: sender.into() }
    }
}

#[async_trait]
impl AlertChannel for LogAlertChannel {
    async fn send_heart_rate_alert(&self, rider_name: &str, rider_email: &str, heart_rate: u32) -> bool {
        let email = compose_heart_rate_alert(&self.sender, rider_name, rider_email, heart_rate);
        info!(to = %email.to, subject = %email.subject, heart_rate, "Heart rate alert (log only)");
        true
    }
}
