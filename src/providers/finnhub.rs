//! Finnhub-style per-symbol fallback provider.
//!
//! The quote endpoint is one call per symbol, so requests are spaced by a
//! small fixed delay. A failed or empty symbol is skipped; the rest of the
//! batch still goes through.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::FinnhubConfig;
use crate::domain::PriceSnapshot;
use crate::error::{EngineError, Result};
use crate::ports::QuoteProvider;

pub struct FinnhubQuoteProvider {
    http: Client,
    base_url: String,
    api_key: String,
    per_symbol_delay: Duration,
}

/// Finnhub /quote payload: c=current, pc=previous close, d=change,
/// dp=change percent. A zero `c` means the symbol is unknown upstream.
#[derive(Debug, Deserialize)]
struct FinnhubQuote {
    c: Option<f64>,
    pc: Option<f64>,
    d: Option<f64>,
    dp: Option<f64>,
}

impl FinnhubQuoteProvider {
    pub fn new(config: &FinnhubConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent("stockpulse/0.1")
            .build()
            .map_err(|e| EngineError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            per_symbol_delay: Duration::from_millis(config.per_symbol_delay_ms),
        })
    }

    fn normalize(symbol: &str, quote: FinnhubQuote) -> Option<PriceSnapshot> {
        let current_price = decimal(quote.c?)?;
        if current_price.is_zero() {
            return None;
        }
        let previous_close = decimal(quote.pc?)?;

        let (fallback_change, fallback_percent) =
            PriceSnapshot::derive_changes(current_price, previous_close);
        let day_change = quote.d.and_then(decimal).unwrap_or(fallback_change);
        let day_change_percent = quote.dp.and_then(decimal).unwrap_or(fallback_percent);

        Some(PriceSnapshot {
            symbol: symbol.to_string(),
            current_price,
            previous_close,
            day_change,
            day_change_percent,
            volume: None,
            average_volume: None,
            week52_high: None,
            week52_low: None,
            technical: None,
            captured_at: Utc::now(),
        })
    }

    async fn fetch_one(&self, symbol: &str) -> Result<Option<PriceSnapshot>> {
        let url = format!("{}/quote", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("symbol", symbol), ("token", self.api_key.as_str())])
            .send()
            .await?
            .error_for_status()?;

        let quote: FinnhubQuote = response.json().await?;
        Ok(Self::normalize(symbol, quote))
    }
}

fn decimal(value: f64) -> Option<Decimal> {
    Decimal::try_from(value).ok()
}

#[async_trait]
impl QuoteProvider for FinnhubQuoteProvider {
    fn name(&self) -> &str {
        "finnhub"
    }

    fn min_interval(&self) -> Duration {
        self.per_symbol_delay
    }

    async fn fetch_quotes(&self, symbols: &[String]) -> Result<Vec<PriceSnapshot>> {
        let mut snapshots = Vec::with_capacity(symbols.len());

        for (i, symbol) in symbols.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.per_symbol_delay).await;
            }
            match self.fetch_one(symbol).await {
                Ok(Some(snapshot)) => snapshots.push(snapshot),
                Ok(None) => warn!(%symbol, "dropping malformed quote from finnhub"),
                Err(e) => warn!(%symbol, error = %e, "finnhub quote failed, skipping symbol"),
            }
        }

        debug!(
            requested = symbols.len(),
            returned = snapshots.len(),
            "finnhub per-symbol quotes complete"
        );
        Ok(snapshots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn normalize_maps_quote_fields() {
        let quote = FinnhubQuote {
            c: Some(106_000.0),
            pc: Some(100_000.0),
            d: None,
            dp: None,
        };
        let snapshot = FinnhubQuoteProvider::normalize("ABC", quote).unwrap();
        assert_eq!(snapshot.current_price, dec!(106000));
        assert_eq!(snapshot.day_change_percent, dec!(6));
    }

    #[test]
    fn normalize_rejects_zero_price() {
        let quote = FinnhubQuote {
            c: Some(0.0),
            pc: Some(100.0),
            d: None,
            dp: None,
        };
        assert!(FinnhubQuoteProvider::normalize("ABC", quote).is_none());
    }

    #[test]
    fn normalize_rejects_missing_previous_close() {
        let quote = FinnhubQuote {
            c: Some(100.0),
            pc: None,
            d: None,
            dp: None,
        };
        assert!(FinnhubQuoteProvider::normalize("ABC", quote).is_none());
    }
}
