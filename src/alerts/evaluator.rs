//! Alert evaluation: readiness policy and condition matching.
//!
//! Readiness is checked at reload time and again defensively at evaluation
//! time, so a rule that became ineligible between reloads cannot fire.
//! Every condition fails closed: absent inputs and unrecognized conditions
//! never match.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::alerts::working_set::AlertWorkingSet;
use crate::cache::PriceCache;
use crate::domain::{AlertCondition, AlertFrequency, AlertRule, PriceSnapshot, TriggerEvent};
use crate::services::Metrics;

const DEFAULT_RSI_OVERBOUGHT: Decimal = dec!(70);
const DEFAULT_RSI_OVERSOLD: Decimal = dec!(30);

/// Rule ids with an emitted event the dispatch queue has not drained yet.
///
/// The dispatcher writes trigger bookkeeping back only when an event is
/// drained, so under queue backlog the working set still shows the rule as
/// ready. This set bridges that gap: the evaluator skips rules listed here,
/// and the dispatcher clears the id when it picks the event up.
#[derive(Default)]
pub struct PendingTriggers {
    ids: Mutex<HashSet<Uuid>>,
}

impl PendingTriggers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a rule as in flight. Returns false when it already was.
    pub async fn insert(&self, id: Uuid) -> bool {
        self.ids.lock().await.insert(id)
    }

    pub async fn remove(&self, id: Uuid) {
        self.ids.lock().await.remove(&id);
    }

    pub async fn contains(&self, id: Uuid) -> bool {
        self.ids.lock().await.contains(&id)
    }
}

/// Frequency/cooldown readiness predicate
pub fn is_ready(rule: &AlertRule, now: DateTime<Utc>) -> bool {
    if rule.settings.disable_after_trigger && rule.triggered {
        return false;
    }
    if rule.settings.frequency == AlertFrequency::Once && rule.triggered {
        return false;
    }
    if let Some(last) = rule.last_triggered {
        if rule.settings.frequency == AlertFrequency::Daily
            && last.date_naive() == now.date_naive()
        {
            return false;
        }
        if now < last + Duration::minutes(rule.settings.cooldown_minutes) {
            return false;
        }
    }
    true
}

/// Full eligibility: activity flag, expiration, and readiness
pub fn is_eligible(rule: &AlertRule, now: DateTime<Utc>) -> bool {
    rule.is_active && !rule.is_expired(now) && is_ready(rule, now)
}

/// Does the latest snapshot satisfy the rule's condition?
pub fn matches(rule: &AlertRule, snapshot: &PriceSnapshot) -> bool {
    let current = snapshot.current_price;
    let prev = snapshot.previous_close;

    match rule.condition {
        AlertCondition::Above => current > rule.value,
        AlertCondition::Below => current < rule.value,
        AlertCondition::Equals => (current - rule.value).abs() < rule.value * dec!(0.01),
        AlertCondition::PercentChangeUp => {
            if prev.is_zero() {
                return false;
            }
            (current - prev) / prev * dec!(100) >= rule.value
        }
        AlertCondition::PercentChangeDown => {
            if prev.is_zero() {
                return false;
            }
            (prev - current) / prev * dec!(100) >= rule.value
        }
        AlertCondition::VolumeSpike => match (snapshot.volume, snapshot.average_volume) {
            (Some(volume), Some(average)) if average > 0 => {
                Decimal::from(volume) >= Decimal::from(average) * rule.volume_multiplier()
            }
            _ => false,
        },
        AlertCondition::VolumeDrop => match (snapshot.volume, snapshot.average_volume) {
            (Some(volume), Some(average)) if average > 0 => {
                let multiplier = rule.volume_multiplier();
                if multiplier.is_zero() {
                    return false;
                }
                Decimal::from(volume) <= Decimal::from(average) / multiplier
            }
            _ => false,
        },
        AlertCondition::RsiOverbought => match snapshot.rsi() {
            Some(rsi) => rsi >= rule.params.rsi_threshold.unwrap_or(DEFAULT_RSI_OVERBOUGHT),
            None => false,
        },
        AlertCondition::RsiOversold => match snapshot.rsi() {
            Some(rsi) => rsi <= rule.params.rsi_threshold.unwrap_or(DEFAULT_RSI_OVERSOLD),
            None => false,
        },
        AlertCondition::NewHigh => match snapshot.week52_high {
            Some(high) => current >= high,
            None => false,
        },
        AlertCondition::NewLow => match snapshot.week52_low {
            Some(low) => current <= low,
            None => false,
        },
        AlertCondition::Unknown => false,
    }
}

/// Evaluates the working set against the price cache on each tick
pub struct AlertEvaluationEngine {
    cache: Arc<PriceCache>,
    working_set: Arc<AlertWorkingSet>,
    queue_tx: mpsc::UnboundedSender<TriggerEvent>,
    pending: Arc<PendingTriggers>,
    metrics: Arc<Metrics>,
}

impl AlertEvaluationEngine {
    pub fn new(
        cache: Arc<PriceCache>,
        working_set: Arc<AlertWorkingSet>,
        queue_tx: mpsc::UnboundedSender<TriggerEvent>,
        pending: Arc<PendingTriggers>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            cache,
            working_set,
            queue_tx,
            pending,
            metrics,
        }
    }

    /// One evaluation pass over the whole working set
    pub async fn evaluate_all(&self) {
        let now = Utc::now();
        let rules = self.working_set.snapshot().await;
        let mut emitted = 0usize;

        for rule in rules.values() {
            if !is_eligible(rule, now) {
                continue;
            }

            let Some(snapshot) = self.cache.get(&rule.symbol).await else {
                // no cached price yet; the next sync cycle will fill it in
                continue;
            };

            if matches(rule, &snapshot) {
                if !self.pending.insert(rule.id).await {
                    debug!(rule_id = %rule.id, "trigger already queued, not re-emitting");
                    continue;
                }
                let event = TriggerEvent {
                    rule_id: rule.id,
                    symbol: rule.symbol.clone(),
                    snapshot,
                    observed_at: now,
                };
                if self.queue_tx.send(event).is_err() {
                    warn!("dispatch queue closed, dropping trigger event");
                    self.pending.remove(rule.id).await;
                    return;
                }
                self.metrics.inc_alerts_triggered();
                emitted += 1;
            }
        }

        if emitted > 0 {
            debug!(emitted, rules = rules.len(), "evaluation pass emitted triggers");
        }
    }
}
