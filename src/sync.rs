//! Price synchronization engine
//!
//! Orchestrates one fetch-through-cache-through-persist-through-broadcast
//! cycle per scheduled tick. Only symbols whose cached snapshot is absent or
//! stale are fetched, which bounds provider call volume. A cycle that finds
//! the previous one still in flight is skipped, never queued.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tracing::{debug, error, info, warn};

use crate::cache::PriceCache;
use crate::config::CacheConfig;
use crate::domain::{topics, ActivationState, PriceDelta};
use crate::ports::{PriceStore, RealtimeBroadcast};
use crate::providers::QuoteSourceAdapter;
use crate::services::{HealthState, Metrics};

const MAX_BACKOFF: Duration = Duration::from_secs(3600);

pub struct PriceSyncEngine {
    cache: Arc<PriceCache>,
    adapter: Arc<QuoteSourceAdapter>,
    price_store: Arc<dyn PriceStore>,
    broadcast: Arc<dyn RealtimeBroadcast>,
    health: Arc<HealthState>,
    metrics: Arc<Metrics>,
    cache_config: CacheConfig,
    max_consecutive_failures: u32,
    backoff_base: Duration,
    state_rx: watch::Receiver<ActivationState>,
    in_flight: AtomicBool,
    backoff_until: RwLock<Option<DateTime<Utc>>>,
}

/// Clears the single-flight flag when the cycle ends, on every exit path
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl PriceSyncEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cache: Arc<PriceCache>,
        adapter: Arc<QuoteSourceAdapter>,
        price_store: Arc<dyn PriceStore>,
        broadcast: Arc<dyn RealtimeBroadcast>,
        health: Arc<HealthState>,
        metrics: Arc<Metrics>,
        cache_config: CacheConfig,
        max_consecutive_failures: u32,
        backoff_base: Duration,
        state_rx: watch::Receiver<ActivationState>,
    ) -> Self {
        Self {
            cache,
            adapter,
            price_store,
            broadcast,
            health,
            metrics,
            cache_config,
            max_consecutive_failures,
            backoff_base,
            state_rx,
            in_flight: AtomicBool::new(false),
            backoff_until: RwLock::new(None),
        }
    }

    fn staleness_window(&self, state: ActivationState) -> Duration {
        match state {
            ActivationState::Active => {
                Duration::from_secs(self.cache_config.active_staleness_secs)
            }
            ActivationState::Standby => {
                Duration::from_secs(self.cache_config.standby_staleness_secs)
            }
        }
    }

    /// Run one sync cycle over `symbols`
    pub async fn sync_once(&self, symbols: &[String]) {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            warn!("previous sync still in flight, skipping this cycle");
            return;
        }
        let _guard = InFlightGuard(&self.in_flight);

        let now = Utc::now();
        if let Some(until) = *self.backoff_until.read().await {
            if now < until {
                debug!(%until, "in failure backoff, skipping sync cycle");
                return;
            }
        }

        let state = *self.state_rx.borrow();
        let window = self.staleness_window(state);
        let (stale, fresh) = self.cache.partition_stale(symbols, window).await;
        debug!(
            stale = stale.len(),
            fresh = fresh.len(),
            state = %state,
            "sync cycle partitioned symbols"
        );

        if stale.is_empty() {
            return;
        }

        let snapshots = self.adapter.fetch_many(&stale).await;
        if snapshots.is_empty() {
            self.handle_failure().await;
            return;
        }

        self.health.record_sync_success().await;
        *self.backoff_until.write().await = None;

        let mut changed = Vec::with_capacity(snapshots.len());
        for snapshot in snapshots {
            let snapshot = snapshot.ensure_derived();
            changed.push(snapshot.symbol.clone());

            // Store failures do not block the in-memory refresh; the write
            // is retried naturally on the next cycle.
            if let Err(e) = self.price_store.upsert_latest(&snapshot).await {
                error!(symbol = %snapshot.symbol, error = %e, "failed to persist latest quote");
                self.health.record_db_check(false);
            } else if let Err(e) = self.price_store.append_history_if_new_day(&snapshot).await {
                error!(symbol = %snapshot.symbol, error = %e, "failed to append price history");
                self.health.record_db_check(false);
            } else {
                self.health.record_db_check(true);
            }

            self.cache.put(snapshot).await;
        }

        let delta = PriceDelta {
            symbols: changed,
            refreshed_at: Utc::now(),
            market_active: state.is_active(),
        };
        match serde_json::to_value(&delta) {
            Ok(payload) => self.broadcast.publish(topics::PRICES, payload).await,
            Err(e) => error!(error = %e, "failed to serialize price delta"),
        }

        self.metrics.inc_sync_cycles();
    }

    async fn handle_failure(&self) {
        let count = self.health.record_sync_failure();
        self.metrics.inc_sync_failures();
        warn!(consecutive = count, "sync cycle produced no snapshots");

        if count >= self.max_consecutive_failures {
            self.health.set_degraded(true);

            let exponent = (count - self.max_consecutive_failures).min(5);
            let backoff = self
                .backoff_base
                .saturating_mul(1 << exponent)
                .min(MAX_BACKOFF);
            let until = Utc::now()
                + chrono::Duration::from_std(backoff).unwrap_or(chrono::Duration::zero());
            *self.backoff_until.write().await = Some(until);
            info!(
                consecutive = count,
                backoff_secs = backoff.as_secs(),
                "market data degraded, backing off"
            );
        }
    }
}
