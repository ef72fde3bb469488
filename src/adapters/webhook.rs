//! Notification gateway webhook client.
//!
//! Posts one JSON document per (channel, recipient) pair to the external
//! gateway that owns actual mail/push/sms delivery. The engine never retries
//! here; delivery is at-most-once by contract.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::domain::NotificationChannel;
use crate::error::{EngineError, Result};
use crate::ports::NotificationSender;

#[derive(Serialize)]
struct GatewayRequest<'a> {
    channel: &'a str,
    recipient: &'a str,
    message: &'a str,
    context: serde_json::Value,
}

pub struct WebhookNotifier {
    http: Client,
    gateway_url: String,
}

impl WebhookNotifier {
    pub fn new(gateway_url: String, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("stockpulse/0.1")
            .build()?;
        Ok(Self { http, gateway_url })
    }
}

#[async_trait]
impl NotificationSender for WebhookNotifier {
    async fn send(
        &self,
        channel: NotificationChannel,
        recipient: &str,
        message: &str,
        context: serde_json::Value,
    ) -> Result<()> {
        let request = GatewayRequest {
            channel: channel.as_str(),
            recipient,
            message,
            context,
        };

        let response = self
            .http
            .post(&self.gateway_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| EngineError::NotificationFailed {
                channel: channel.as_str().to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::NotificationFailed {
                channel: channel.as_str().to_string(),
                reason: format!("HTTP {status}: {body}"),
            });
        }

        debug!(channel = %channel, recipient, "notification accepted by gateway");
        Ok(())
    }
}
