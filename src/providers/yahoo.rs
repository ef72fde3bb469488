//! Yahoo-style batch quote provider (primary source).
//!
//! One request covers the whole symbol batch. Entries missing the required
//! numeric fields are dropped individually so one bad symbol never fails the
//! batch.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::YahooConfig;
use crate::domain::{PriceSnapshot, TechnicalIndicators};
use crate::error::{EngineError, Result};
use crate::ports::QuoteProvider;

pub struct YahooQuoteProvider {
    http: Client,
    base_url: String,
    min_interval: Duration,
}

#[derive(Debug, Deserialize)]
struct QuoteEnvelope {
    #[serde(rename = "quoteResponse")]
    quote_response: QuoteBody,
}

#[derive(Debug, Deserialize)]
struct QuoteBody {
    #[serde(default)]
    result: Vec<YahooQuote>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YahooQuote {
    symbol: String,
    regular_market_price: Option<f64>,
    regular_market_previous_close: Option<f64>,
    regular_market_change: Option<f64>,
    regular_market_change_percent: Option<f64>,
    regular_market_volume: Option<u64>,
    average_daily_volume3_month: Option<u64>,
    fifty_two_week_high: Option<f64>,
    fifty_two_week_low: Option<f64>,
    rsi14: Option<f64>,
}

impl YahooQuoteProvider {
    pub fn new(config: &YahooConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent("stockpulse/0.1")
            .build()
            .map_err(|e| EngineError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            min_interval: Duration::from_secs(config.min_interval_secs),
        })
    }

    fn normalize(quote: YahooQuote) -> Option<PriceSnapshot> {
        let current_price = decimal(quote.regular_market_price?)?;
        let previous_close = decimal(quote.regular_market_previous_close?)?;

        let (fallback_change, fallback_percent) =
            PriceSnapshot::derive_changes(current_price, previous_close);
        let day_change = quote
            .regular_market_change
            .and_then(decimal)
            .unwrap_or(fallback_change);
        let day_change_percent = quote
            .regular_market_change_percent
            .and_then(decimal)
            .unwrap_or(fallback_percent);

        let technical = quote
            .rsi14
            .and_then(decimal)
            .map(|rsi| TechnicalIndicators { rsi: Some(rsi) });

        Some(PriceSnapshot {
            symbol: quote.symbol,
            current_price,
            previous_close,
            day_change,
            day_change_percent,
            volume: quote.regular_market_volume,
            average_volume: quote.average_daily_volume3_month,
            week52_high: quote.fifty_two_week_high.and_then(decimal),
            week52_low: quote.fifty_two_week_low.and_then(decimal),
            technical,
            captured_at: Utc::now(),
        })
    }
}

fn decimal(value: f64) -> Option<Decimal> {
    Decimal::try_from(value).ok()
}

#[async_trait]
impl QuoteProvider for YahooQuoteProvider {
    fn name(&self) -> &str {
        "yahoo"
    }

    fn min_interval(&self) -> Duration {
        self.min_interval
    }

    async fn fetch_quotes(&self, symbols: &[String]) -> Result<Vec<PriceSnapshot>> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v7/finance/quote", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("symbols", symbols.join(","))])
            .send()
            .await?
            .error_for_status()?;

        let envelope: QuoteEnvelope = response.json().await?;
        let requested = symbols.len();

        let mut snapshots = Vec::with_capacity(envelope.quote_response.result.len());
        for quote in envelope.quote_response.result {
            let symbol = quote.symbol.clone();
            match Self::normalize(quote) {
                Some(snapshot) => snapshots.push(snapshot),
                None => warn!(%symbol, "dropping malformed quote from yahoo"),
            }
        }

        debug!(
            requested,
            returned = snapshots.len(),
            "yahoo batch quote complete"
        );
        Ok(snapshots)
    }
}
