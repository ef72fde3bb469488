//! Alert rule types
//!
//! Rules are authored through the external CRUD surface and read here via the
//! store port. The engine only mutates the trigger bookkeeping fields.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Broad category of an alert rule, as stored alongside the condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    #[default]
    Price,
    Volume,
    Technical,
}

/// Condition a rule evaluates against the latest snapshot.
///
/// Conditions the engine does not recognize deserialize to `Unknown` and
/// never match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertCondition {
    Above,
    Below,
    Equals,
    PercentChangeUp,
    PercentChangeDown,
    VolumeSpike,
    VolumeDrop,
    RsiOverbought,
    RsiOversold,
    NewHigh,
    NewLow,
    #[serde(other)]
    Unknown,
}

impl AlertCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Above => "above",
            Self::Below => "below",
            Self::Equals => "equals",
            Self::PercentChangeUp => "percent-change-up",
            Self::PercentChangeDown => "percent-change-down",
            Self::VolumeSpike => "volume-spike",
            Self::VolumeDrop => "volume-drop",
            Self::RsiOverbought => "rsi-overbought",
            Self::RsiOversold => "rsi-oversold",
            Self::NewHigh => "new-high",
            Self::NewLow => "new-low",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for AlertCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How often a rule may fire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AlertFrequency {
    Once,
    Daily,
    #[default]
    Always,
}

/// Outbound notification channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Email,
    Push,
    Sms,
}

impl NotificationChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Push => "push",
            Self::Sms => "sms",
        }
    }
}

impl std::fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-rule channel toggles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ChannelSet {
    #[serde(default)]
    pub email: bool,
    #[serde(default)]
    pub push: bool,
    #[serde(default)]
    pub sms: bool,
}

impl ChannelSet {
    /// Channels currently enabled, in dispatch order
    pub fn enabled(&self) -> Vec<NotificationChannel> {
        let mut channels = Vec::new();
        if self.email {
            channels.push(NotificationChannel::Email);
        }
        if self.push {
            channels.push(NotificationChannel::Push);
        }
        if self.sms {
            channels.push(NotificationChannel::Sms);
        }
        channels
    }
}

/// Frequency/cooldown/expiration policy for a rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertSettings {
    #[serde(default)]
    pub frequency: AlertFrequency,
    /// Minimum minutes between two triggers of the same rule
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: i64,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub disable_after_trigger: bool,
    #[serde(default)]
    pub channels: ChannelSet,
}

fn default_cooldown_minutes() -> i64 {
    60
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            frequency: AlertFrequency::Always,
            cooldown_minutes: default_cooldown_minutes(),
            expires_at: None,
            disable_after_trigger: false,
            channels: ChannelSet::default(),
        }
    }
}

/// Extra evaluation parameters for volume/technical conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AlertParams {
    /// Multiplier for volume-spike/volume-drop (e.g. 2 = double the average)
    #[serde(default)]
    pub multiplier: Option<Decimal>,
    /// RSI threshold override (defaults: 70 overbought, 30 oversold)
    #[serde(default)]
    pub rsi_threshold: Option<Decimal>,
}

/// A user-defined trigger rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub symbol: String,
    #[serde(default)]
    pub kind: AlertKind,
    pub condition: AlertCondition,
    pub value: Decimal,
    /// Custom notification text; overrides the templated message when set
    #[serde(default)]
    pub message: Option<String>,
    pub is_active: bool,
    #[serde(default)]
    pub triggered: bool,
    #[serde(default)]
    pub triggered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub triggered_price: Option<Decimal>,
    #[serde(default)]
    pub trigger_count: u32,
    #[serde(default)]
    pub last_triggered: Option<DateTime<Utc>>,
    #[serde(default)]
    pub settings: AlertSettings,
    #[serde(default)]
    pub params: AlertParams,
}

impl AlertRule {
    /// Past its expiration timestamp, if one is set
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.settings.expires_at.is_some_and(|at| now >= at)
    }

    /// Volume multiplier with the conventional default of 2x
    pub fn volume_multiplier(&self) -> Decimal {
        self.params
            .multiplier
            .unwrap_or_else(|| Decimal::from(2))
    }
}
