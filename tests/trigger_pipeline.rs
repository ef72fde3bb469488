//! End-to-end trigger pipeline: cache -> working set -> evaluation ->
//! dispatch -> persistence, notification, and realtime fan-out.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use stockpulse::adapters::BroadcastHub;
use stockpulse::alerts::{AlertEvaluationEngine, AlertWorkingSet, DispatchQueue, PendingTriggers};
use stockpulse::cache::PriceCache;
use stockpulse::domain::{
    AlertCondition, AlertFrequency, AlertKind, AlertParams, AlertRule, AlertSettings, ChannelSet,
    NotificationChannel, PriceSnapshot,
};
use stockpulse::error::Result;
use stockpulse::ports::{AlertStore, NotificationSender};
use stockpulse::services::Metrics;

/// Alert store backed by a mutexed map, standing in for Postgres
struct InMemoryAlertStore {
    rules: Mutex<HashMap<Uuid, AlertRule>>,
}

impl InMemoryAlertStore {
    fn new(rules: Vec<AlertRule>) -> Self {
        Self {
            rules: Mutex::new(rules.into_iter().map(|r| (r.id, r)).collect()),
        }
    }

    async fn get(&self, id: Uuid) -> Option<AlertRule> {
        self.rules.lock().await.get(&id).cloned()
    }
}

#[async_trait]
impl AlertStore for InMemoryAlertStore {
    async fn load_eligible_alerts(&self) -> Result<Vec<AlertRule>> {
        let now = Utc::now();
        Ok(self
            .rules
            .lock()
            .await
            .values()
            .filter(|r| r.is_active && !r.is_expired(now))
            .cloned()
            .collect())
    }

    async fn save_alert_state(&self, rule: &AlertRule) -> Result<()> {
        self.rules.lock().await.insert(rule.id, rule.clone());
        Ok(())
    }
}

/// Records every delivery attempt
#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(NotificationChannel, String, String)>>,
}

#[async_trait]
impl NotificationSender for RecordingNotifier {
    async fn send(
        &self,
        channel: NotificationChannel,
        recipient: &str,
        message: &str,
        _context: serde_json::Value,
    ) -> Result<()> {
        self.sent
            .lock()
            .await
            .push((channel, recipient.to_string(), message.to_string()));
        Ok(())
    }
}

fn above_rule(symbol: &str, value: rust_decimal::Decimal) -> AlertRule {
    AlertRule {
        id: Uuid::new_v4(),
        owner_id: Uuid::new_v4(),
        symbol: symbol.to_string(),
        kind: AlertKind::Price,
        condition: AlertCondition::Above,
        value,
        message: None,
        is_active: true,
        triggered: false,
        triggered_at: None,
        triggered_price: None,
        trigger_count: 0,
        last_triggered: None,
        settings: AlertSettings {
            frequency: AlertFrequency::Once,
            channels: ChannelSet {
                email: true,
                push: false,
                sms: false,
            },
            ..AlertSettings::default()
        },
        params: AlertParams::default(),
    }
}

fn snapshot(symbol: &str, current: rust_decimal::Decimal, prev: rust_decimal::Decimal) -> PriceSnapshot {
    let (change, percent) = PriceSnapshot::derive_changes(current, prev);
    PriceSnapshot {
        symbol: symbol.to_string(),
        current_price: current,
        previous_close: prev,
        day_change: change,
        day_change_percent: percent,
        volume: None,
        average_volume: None,
        week52_high: None,
        week52_low: None,
        technical: None,
        captured_at: Utc::now(),
    }
}

struct Pipeline {
    store: Arc<InMemoryAlertStore>,
    cache: Arc<PriceCache>,
    working_set: Arc<AlertWorkingSet>,
    evaluator: AlertEvaluationEngine,
    dispatcher: DispatchQueue,
    queue_rx: mpsc::UnboundedReceiver<stockpulse::domain::TriggerEvent>,
    notifier: Arc<RecordingNotifier>,
    hub: Arc<BroadcastHub>,
}

fn pipeline(rules: Vec<AlertRule>) -> Pipeline {
    let metrics = Arc::new(Metrics::new());
    let store = Arc::new(InMemoryAlertStore::new(rules));
    let cache = Arc::new(PriceCache::new());
    let hub = Arc::new(BroadcastHub::new(16));
    let notifier = Arc::new(RecordingNotifier::default());

    let working_set = Arc::new(AlertWorkingSet::new(store.clone(), Arc::clone(&metrics)));
    let (queue_tx, queue_rx) = mpsc::unbounded_channel();
    let pending = Arc::new(PendingTriggers::new());
    let evaluator = AlertEvaluationEngine::new(
        Arc::clone(&cache),
        Arc::clone(&working_set),
        queue_tx,
        Arc::clone(&pending),
        Arc::clone(&metrics),
    );
    let dispatcher = DispatchQueue::new(
        store.clone(),
        Arc::clone(&working_set),
        Some(notifier.clone()),
        hub.clone(),
        pending,
        metrics,
        Duration::from_millis(10),
    );

    Pipeline {
        store,
        cache,
        working_set,
        evaluator,
        dispatcher,
        queue_rx,
        notifier,
        hub,
    }
}

#[tokio::test]
async fn above_alert_flows_from_cache_to_notification() {
    let rule = above_rule("AAPL", dec!(100000));
    let rule_id = rule.id;
    let owner = rule.owner_id;
    let mut p = pipeline(vec![rule]);

    let mut frames = p.hub.subscribe();

    p.working_set.reload().await;
    p.cache.put(snapshot("AAPL", dec!(105000), dec!(100000))).await;

    p.evaluator.evaluate_all().await;
    let event = p.queue_rx.try_recv().expect("trigger event enqueued");
    assert_eq!(event.rule_id, rule_id);

    p.dispatcher.process(event).await;

    // persisted bookkeeping
    let saved = p.store.get(rule_id).await.expect("rule still stored");
    assert!(saved.triggered);
    assert_eq!(saved.trigger_count, 1);
    assert_eq!(saved.triggered_price, Some(dec!(105000)));

    // one email went out with both prices in the text
    let sent = p.notifier.sent.lock().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, NotificationChannel::Email);
    assert_eq!(sent[0].1, owner.to_string());
    assert!(sent[0].2.contains("105,000"));
    assert!(sent[0].2.contains("100,000"));

    // realtime frame on the owner topic
    let frame = frames.recv().await.expect("alert frame broadcast");
    assert_eq!(frame.topic, format!("alerts:{owner}"));
    assert_eq!(frame.payload["symbol"], "AAPL");
}

#[tokio::test]
async fn once_rule_fires_at_most_once_across_passes() {
    let rule = above_rule("AAPL", dec!(100000));
    let mut p = pipeline(vec![rule]);

    p.working_set.reload().await;
    p.cache.put(snapshot("AAPL", dec!(105000), dec!(100000))).await;

    p.evaluator.evaluate_all().await;
    let event = p.queue_rx.try_recv().expect("first trigger");
    p.dispatcher.process(event).await;

    // second pass over the same (still matching) price must emit nothing
    p.evaluator.evaluate_all().await;
    assert!(p.queue_rx.try_recv().is_err());
    assert!(p.working_set.is_empty().await);

    assert_eq!(p.notifier.sent.lock().await.len(), 1);
}

#[tokio::test]
async fn non_matching_price_emits_nothing() {
    let rule = above_rule("AAPL", dec!(100000));
    let mut p = pipeline(vec![rule]);

    p.working_set.reload().await;
    p.cache.put(snapshot("AAPL", dec!(99000), dec!(100000))).await;

    p.evaluator.evaluate_all().await;
    assert!(p.queue_rx.try_recv().is_err());
}

#[tokio::test]
async fn recurring_rule_respects_cooldown_after_dispatch() {
    let mut rule = above_rule("AAPL", dec!(100000));
    rule.settings.frequency = AlertFrequency::Always;
    rule.settings.cooldown_minutes = 60;
    let mut p = pipeline(vec![rule]);

    p.working_set.reload().await;
    p.cache.put(snapshot("AAPL", dec!(105000), dec!(100000))).await;

    p.evaluator.evaluate_all().await;
    let event = p.queue_rx.try_recv().expect("first trigger");
    p.dispatcher.process(event).await;

    // the rule stays in the working set but is inside its cooldown
    assert_eq!(p.working_set.len().await, 1);
    p.evaluator.evaluate_all().await;
    assert!(p.queue_rx.try_recv().is_err());
}

#[tokio::test]
async fn evaluation_backlog_yields_one_notification_per_cooldown() {
    let mut rule = above_rule("AAPL", dec!(100000));
    rule.settings.frequency = AlertFrequency::Always;
    rule.settings.cooldown_minutes = 60;
    let mut p = pipeline(vec![rule]);

    p.working_set.reload().await;
    p.cache.put(snapshot("AAPL", dec!(105000), dec!(100000))).await;

    // two evaluation passes run before the dispatcher drains anything
    p.evaluator.evaluate_all().await;
    p.evaluator.evaluate_all().await;

    let event = p.queue_rx.try_recv().expect("single trigger event");
    assert!(p.queue_rx.try_recv().is_err());

    p.dispatcher.process(event).await;
    assert_eq!(p.notifier.sent.lock().await.len(), 1);

    // the drained bookkeeping now blocks re-emission the normal way
    p.evaluator.evaluate_all().await;
    assert!(p.queue_rx.try_recv().is_err());
}

#[tokio::test]
async fn reload_does_not_resurrect_triggered_once_rules() {
    let rule = above_rule("AAPL", dec!(100000));
    let mut p = pipeline(vec![rule]);

    p.working_set.reload().await;
    p.cache.put(snapshot("AAPL", dec!(105000), dec!(100000))).await;

    p.evaluator.evaluate_all().await;
    let event = p.queue_rx.try_recv().expect("trigger");
    p.dispatcher.process(event).await;

    // a fresh reload re-reads the store, where the rule is now triggered
    p.working_set.reload().await;
    assert!(p.working_set.is_empty().await);
}
