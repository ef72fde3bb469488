//! Quote source adapter: ordered provider chain with per-provider throttling
//! and fall-through on failure.
//!
//! Partial or total provider failure never propagates past this layer; the
//! adapter just returns fewer snapshots than requested.

pub mod finnhub;
pub mod yahoo;

pub use finnhub::FinnhubQuoteProvider;
pub use yahoo::YahooQuoteProvider;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use crate::domain::PriceSnapshot;
use crate::ports::QuoteProvider;
use crate::services::Metrics;

/// Fetches quotes from providers in priority order
pub struct QuoteSourceAdapter {
    providers: Vec<Arc<dyn QuoteProvider>>,
    call_timeout: Duration,
    last_call: Mutex<HashMap<String, Instant>>,
    metrics: Arc<Metrics>,
}

impl QuoteSourceAdapter {
    pub fn new(
        providers: Vec<Arc<dyn QuoteProvider>>,
        call_timeout: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            providers,
            call_timeout,
            last_call: Mutex::new(HashMap::new()),
            metrics,
        }
    }

    /// Wait out the provider's minimum inter-request interval, then record
    /// this call.
    async fn throttle(&self, provider: &dyn QuoteProvider) {
        let min_interval = provider.min_interval();
        if min_interval.is_zero() {
            return;
        }

        let wait = {
            let calls = self.last_call.lock().await;
            calls.get(provider.name()).and_then(|last| {
                min_interval.checked_sub(last.elapsed())
            })
        };

        if let Some(wait) = wait {
            debug!(provider = provider.name(), ?wait, "throttling provider call");
            tokio::time::sleep(wait).await;
        }

        self.last_call
            .lock()
            .await
            .insert(provider.name().to_string(), Instant::now());
    }

    /// Fetch snapshots for `symbols`, trying each provider in order until one
    /// returns usable results. Returns an empty vec when every provider fails
    /// or returns nothing.
    pub async fn fetch_many(&self, symbols: &[String]) -> Vec<PriceSnapshot> {
        if symbols.is_empty() {
            return Vec::new();
        }

        for (index, provider) in self.providers.iter().enumerate() {
            self.throttle(provider.as_ref()).await;

            let result = timeout(self.call_timeout, provider.fetch_quotes(symbols)).await;
            match result {
                Err(_) => {
                    warn!(
                        provider = provider.name(),
                        timeout_secs = self.call_timeout.as_secs(),
                        "provider call timed out"
                    );
                }
                Ok(Err(e)) => {
                    warn!(provider = provider.name(), error = %e, "provider call failed");
                }
                Ok(Ok(snapshots)) if snapshots.is_empty() => {
                    info!(
                        provider = provider.name(),
                        "provider returned no usable quotes, falling through"
                    );
                }
                Ok(Ok(snapshots)) => {
                    if index > 0 {
                        self.metrics.inc_provider_fallbacks();
                    }
                    self.metrics.add_snapshots_fetched(snapshots.len() as u64);
                    return snapshots;
                }
            }
        }

        warn!(
            symbols = symbols.len(),
            "all providers failed, skipping batch this cycle"
        );
        Vec::new()
    }
}
