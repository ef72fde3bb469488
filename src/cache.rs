//! Process-wide price cache
//!
//! Time-bounded symbol -> snapshot store. Entries are replaced wholesale,
//! never patched; readers get an `Arc` to the snapshot that was live at read
//! time. The freshness window is supplied by the caller since it differs
//! between the active and standby cadences.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::domain::PriceSnapshot;

#[derive(Debug, Clone)]
struct CacheEntry {
    snapshot: Arc<PriceSnapshot>,
    inserted_at: DateTime<Utc>,
}

/// Single-writer-many-reader snapshot cache
#[derive(Debug, Default)]
pub struct PriceCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl PriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the snapshot for a symbol
    pub async fn put(&self, snapshot: PriceSnapshot) {
        let entry = CacheEntry {
            snapshot: Arc::new(snapshot),
            inserted_at: Utc::now(),
        };
        self.entries
            .write()
            .await
            .insert(entry.snapshot.symbol.clone(), entry);
    }

    /// Latest snapshot for a symbol, fresh or not
    pub async fn get(&self, symbol: &str) -> Option<Arc<PriceSnapshot>> {
        self.entries
            .read()
            .await
            .get(symbol)
            .map(|e| Arc::clone(&e.snapshot))
    }

    /// True iff the entry exists and is younger than `window`
    pub async fn is_fresh(&self, symbol: &str, window: Duration) -> bool {
        let entries = self.entries.read().await;
        match entries.get(symbol) {
            Some(entry) => age_within(entry.inserted_at, window),
            None => false,
        }
    }

    /// Split `symbols` into (needs refresh, still fresh). Symbols absent from
    /// the cache count as needing refresh.
    pub async fn partition_stale(
        &self,
        symbols: &[String],
        window: Duration,
    ) -> (Vec<String>, Vec<String>) {
        let entries = self.entries.read().await;
        let mut stale = Vec::new();
        let mut fresh = Vec::new();
        for symbol in symbols {
            match entries.get(symbol) {
                Some(entry) if age_within(entry.inserted_at, window) => {
                    fresh.push(symbol.clone())
                }
                _ => stale.push(symbol.clone()),
            }
        }
        (stale, fresh)
    }

    /// Number of cached symbols
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

fn age_within(inserted_at: DateTime<Utc>, window: Duration) -> bool {
    let age = Utc::now().signed_duration_since(inserted_at);
    age < chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snapshot(symbol: &str) -> PriceSnapshot {
        PriceSnapshot {
            symbol: symbol.to_string(),
            current_price: dec!(100),
            previous_close: dec!(98),
            day_change: dec!(2),
            day_change_percent: dec!(2.04),
            volume: Some(1_000),
            average_volume: Some(900),
            week52_high: None,
            week52_low: None,
            technical: None,
            captured_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn round_trip_returns_identical_snapshot() {
        let cache = PriceCache::new();
        let snap = snapshot("AAPL");
        cache.put(snap.clone()).await;

        let read = cache.get("AAPL").await.unwrap();
        assert_eq!(*read, snap);
    }

    #[tokio::test]
    async fn put_replaces_wholesale() {
        let cache = PriceCache::new();
        cache.put(snapshot("AAPL")).await;

        let mut updated = snapshot("AAPL");
        updated.current_price = dec!(120);
        cache.put(updated).await;

        let read = cache.get("AAPL").await.unwrap();
        assert_eq!(read.current_price, dec!(120));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn missing_symbol_is_not_fresh() {
        let cache = PriceCache::new();
        assert!(!cache.is_fresh("MSFT", Duration::from_secs(60)).await);
    }

    #[tokio::test]
    async fn fresh_entry_within_window() {
        let cache = PriceCache::new();
        cache.put(snapshot("AAPL")).await;
        assert!(cache.is_fresh("AAPL", Duration::from_secs(60)).await);
        assert!(!cache.is_fresh("AAPL", Duration::from_millis(0)).await);
    }

    #[tokio::test]
    async fn partition_separates_stale_and_fresh() {
        let cache = PriceCache::new();
        cache.put(snapshot("AAPL")).await;

        let symbols = vec!["AAPL".to_string(), "MSFT".to_string()];
        let (stale, fresh) = cache
            .partition_stale(&symbols, Duration::from_secs(60))
            .await;
        assert_eq!(stale, vec!["MSFT".to_string()]);
        assert_eq!(fresh, vec!["AAPL".to_string()]);
    }
}
