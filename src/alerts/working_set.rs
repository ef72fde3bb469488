//! In-memory mirror of alert rules that are currently eligible to evaluate.
//!
//! Rebuilt from the store on a fixed interval and swapped atomically, so a
//! concurrent evaluation pass always sees one consistent version. Rules that
//! fire with `once` frequency or `disable_after_trigger` are removed
//! immediately instead of waiting for the next reload.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::alerts::evaluator::is_eligible;
use crate::domain::AlertRule;
use crate::ports::AlertStore;
use crate::services::Metrics;

pub struct AlertWorkingSet {
    store: Arc<dyn AlertStore>,
    rules: RwLock<Arc<HashMap<Uuid, AlertRule>>>,
    metrics: Arc<Metrics>,
}

impl AlertWorkingSet {
    pub fn new(store: Arc<dyn AlertStore>, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            rules: RwLock::new(Arc::new(HashMap::new())),
            metrics,
        }
    }

    /// Rebuild the working set from the store. On a store error the previous
    /// set stays in place; evaluation is never blocked by a failed reload.
    pub async fn reload(&self) {
        let loaded = match self.store.load_eligible_alerts().await {
            Ok(rules) => rules,
            Err(e) => {
                error!(error = %e, "working set reload failed, keeping previous set");
                return;
            }
        };

        let now = Utc::now();
        let total = loaded.len();
        let map: HashMap<Uuid, AlertRule> = loaded
            .into_iter()
            .filter(|rule| is_eligible(rule, now))
            .map(|rule| (rule.id, rule))
            .collect();

        info!(
            eligible = map.len(),
            loaded = total,
            "alert working set reloaded"
        );
        self.metrics.inc_working_set_reloads();
        *self.rules.write().await = Arc::new(map);
    }

    /// Current consistent view of the working set
    pub async fn snapshot(&self) -> Arc<HashMap<Uuid, AlertRule>> {
        Arc::clone(&*self.rules.read().await)
    }

    /// Remove a rule immediately, without waiting for the next reload
    pub async fn remove(&self, id: Uuid) {
        let mut guard = self.rules.write().await;
        if guard.contains_key(&id) {
            let mut map = (**guard).clone();
            map.remove(&id);
            *guard = Arc::new(map);
            debug!(rule_id = %id, "rule removed from working set");
        }
    }

    /// Replace a rule's entry with updated trigger bookkeeping, so cooldown
    /// and frequency policy hold between reloads
    pub async fn update(&self, rule: AlertRule) {
        let mut guard = self.rules.write().await;
        if guard.contains_key(&rule.id) {
            let mut map = (**guard).clone();
            map.insert(rule.id, rule);
            *guard = Arc::new(map);
        }
    }

    /// Distinct symbols referenced by the working set, for the sync universe
    pub async fn symbols(&self) -> Vec<String> {
        let rules = self.snapshot().await;
        let mut symbols: Vec<String> = rules.values().map(|r| r.symbol.clone()).collect();
        symbols.sort();
        symbols.dedup();
        symbols
    }

    pub async fn len(&self) -> usize {
        self.rules.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rules.read().await.is_empty()
    }
}
