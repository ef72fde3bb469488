//! Trigger dispatch queue
//!
//! Single consumer, drained at a fixed rate (one event per interval tick) as
//! a backpressure valve against notification-provider rate limits. The
//! triggered state change is persisted first; notification delivery is
//! at-most-once and a failed channel never blocks the others or re-enqueues
//! the event.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use crate::alerts::evaluator::{is_ready, PendingTriggers};
use crate::alerts::message;
use crate::alerts::working_set::AlertWorkingSet;
use crate::domain::{topics, AlertFrequency, TriggerEvent};
use crate::ports::{AlertStore, NotificationSender, RealtimeBroadcast};
use crate::services::Metrics;

pub struct DispatchQueue {
    alert_store: Arc<dyn AlertStore>,
    working_set: Arc<AlertWorkingSet>,
    notifier: Option<Arc<dyn NotificationSender>>,
    broadcast: Arc<dyn RealtimeBroadcast>,
    pending: Arc<PendingTriggers>,
    metrics: Arc<Metrics>,
    drain_interval: Duration,
}

impl DispatchQueue {
    pub fn new(
        alert_store: Arc<dyn AlertStore>,
        working_set: Arc<AlertWorkingSet>,
        notifier: Option<Arc<dyn NotificationSender>>,
        broadcast: Arc<dyn RealtimeBroadcast>,
        pending: Arc<PendingTriggers>,
        metrics: Arc<Metrics>,
        drain_interval: Duration,
    ) -> Self {
        Self {
            alert_store,
            working_set,
            notifier,
            broadcast,
            pending,
            metrics,
            drain_interval,
        }
    }

    /// Drain loop: at most one event per interval tick, until shutdown.
    /// Runs in both activation states.
    pub async fn run(
        &self,
        mut rx: mpsc::UnboundedReceiver<TriggerEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(self.drain_interval);
        info!(
            interval_ms = self.drain_interval.as_millis() as u64,
            "dispatch queue draining"
        );
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Ok(event) = rx.try_recv() {
                        self.process(event).await;
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("dispatch queue stopping");
                        return;
                    }
                }
            }
        }
    }

    /// Handle one trigger event: persist state, prune the working set,
    /// notify, publish.
    pub async fn process(&self, event: TriggerEvent) {
        self.pending.remove(event.rule_id).await;

        let rules = self.working_set.snapshot().await;
        let Some(rule) = rules.get(&event.rule_id) else {
            debug!(rule_id = %event.rule_id, "rule left working set before dispatch, dropping");
            return;
        };
        let mut rule = rule.clone();

        let now = Utc::now();
        // this queue is the only writer of trigger bookkeeping, so a rule
        // that is no longer ready here was already dispatched once
        if !is_ready(&rule, now) {
            debug!(rule_id = %rule.id, "rule no longer ready at drain time, dropping event");
            return;
        }

        rule.triggered = true;
        rule.triggered_at = Some(now);
        rule.last_triggered = Some(now);
        rule.triggered_price = Some(event.snapshot.current_price);
        rule.trigger_count += 1;
        if rule.settings.disable_after_trigger {
            rule.is_active = false;
        }

        if let Err(e) = self.alert_store.save_alert_state(&rule).await {
            // the in-memory bookkeeping below still prevents a re-fire storm
            error!(rule_id = %rule.id, error = %e, "failed to persist triggered state");
        }

        if rule.settings.disable_after_trigger
            || rule.settings.frequency == AlertFrequency::Once
        {
            self.working_set.remove(rule.id).await;
        } else {
            self.working_set.update(rule.clone()).await;
        }

        let text = message::render(&rule, &event.snapshot);
        let context = json!({
            "rule_id": rule.id,
            "symbol": rule.symbol,
            "condition": rule.condition,
            "price": event.snapshot.current_price,
            "observed_at": event.observed_at,
        });

        if let Some(notifier) = &self.notifier {
            let recipient = rule.owner_id.to_string();
            for channel in rule.settings.channels.enabled() {
                match notifier
                    .send(channel, &recipient, &text, context.clone())
                    .await
                {
                    Ok(()) => self.metrics.inc_notifications_sent(),
                    Err(e) => {
                        self.metrics.inc_notifications_failed();
                        error!(
                            rule_id = %rule.id,
                            channel = %channel,
                            error = %e,
                            "notification channel failed"
                        );
                    }
                }
            }
        }

        let payload = json!({
            "rule_id": rule.id,
            "symbol": rule.symbol,
            "condition": rule.condition,
            "price": event.snapshot.current_price,
            "message": text,
            "triggered_at": now,
        });
        self.broadcast
            .publish(&topics::alerts_for(rule.owner_id), payload)
            .await;

        info!(rule_id = %rule.id, symbol = %rule.symbol, "alert dispatched");
    }
}
