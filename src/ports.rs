//! Collaborator ports consumed by the engine.
//!
//! The persistent store, quote providers, realtime transport, and
//! notification sender are external to this subsystem; the engine only sees
//! these seams.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::{AlertRule, NotificationChannel, PriceSnapshot};
use crate::error::Result;

/// Read/write access to alert rules in the persistent store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// All rules with `is_active = true` that have not expired
    async fn load_eligible_alerts(&self) -> Result<Vec<AlertRule>>;

    /// Persist the trigger bookkeeping fields of a rule
    async fn save_alert_state(&self, rule: &AlertRule) -> Result<()>;
}

/// Write access to persisted price data
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceStore: Send + Sync {
    /// Update the latest-quote fields for a symbol
    async fn upsert_latest(&self, snapshot: &PriceSnapshot) -> Result<()>;

    /// Append an OHLCV history row, but only once per calendar day
    async fn append_history_if_new_day(&self, snapshot: &PriceSnapshot) -> Result<()>;
}

/// One external quote source
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Minimum interval between two requests to this provider
    fn min_interval(&self) -> Duration;

    /// Fetch quotes for the given symbols. Partial results are fine; symbols
    /// with malformed payloads are dropped, not errored.
    async fn fetch_quotes(&self, symbols: &[String]) -> Result<Vec<PriceSnapshot>>;
}

/// Publish-subscribe fan-out to browser clients
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RealtimeBroadcast: Send + Sync {
    async fn publish(&self, topic: &str, payload: serde_json::Value);
}

/// Outbound notification transport (mail/push/sms gateway)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(
        &self,
        channel: NotificationChannel,
        recipient: &str,
        message: &str,
        context: serde_json::Value,
    ) -> Result<()>;
}
