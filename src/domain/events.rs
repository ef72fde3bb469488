//! Transient events flowing between engine components and out to the
//! realtime transport.

use crate::domain::PriceSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Whether the system is running its fast or slow cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationState {
    Active,
    Standby,
}

impl ActivationState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Standby => "standby",
        }
    }
}

impl std::fmt::Display for ActivationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Signal produced when a ready rule's condition matches the latest snapshot.
/// Created by the evaluator, consumed exactly once by the dispatch queue.
#[derive(Debug, Clone)]
pub struct TriggerEvent {
    pub rule_id: Uuid,
    pub symbol: String,
    pub snapshot: Arc<PriceSnapshot>,
    pub observed_at: DateTime<Utc>,
}

/// Compact delta broadcast after a sync cycle. Carries the refreshed symbol
/// set only, never snapshot payloads, so message size is bounded regardless
/// of universe size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceDelta {
    pub symbols: Vec<String>,
    pub refreshed_at: DateTime<Utc>,
    pub market_active: bool,
}

/// Broadcast payload for an activation window transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationChange {
    pub state: ActivationState,
    pub at: DateTime<Utc>,
}

/// Broadcast topics used on the realtime transport
pub mod topics {
    pub const PRICES: &str = "prices";
    pub const ACTIVATION: &str = "activation";

    /// Owner-scoped topic for alert-triggered events
    pub fn alerts_for(owner_id: uuid::Uuid) -> String {
        format!("alerts:{owner_id}")
    }
}
