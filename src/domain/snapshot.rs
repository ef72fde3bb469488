//! Price snapshot value types
//!
//! A snapshot is a point-in-time price/volume record for one symbol. It is
//! immutable once produced; a new snapshot supersedes the old one wholesale.
//!
//! `previous_close` always means the prior trading day's close as reported by
//! the quote provider. It is never backfilled from an earlier sync cycle.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Optional technical indicators attached to a snapshot by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TechnicalIndicators {
    /// Relative strength index (0..100), if the provider computes one
    pub rsi: Option<Decimal>,
}

/// Point-in-time quote for a single symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub symbol: String,
    pub current_price: Decimal,
    pub previous_close: Decimal,
    pub day_change: Decimal,
    pub day_change_percent: Decimal,
    pub volume: Option<u64>,
    pub average_volume: Option<u64>,
    pub week52_high: Option<Decimal>,
    pub week52_low: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub technical: Option<TechnicalIndicators>,
    pub captured_at: DateTime<Utc>,
}

impl PriceSnapshot {
    /// Compute day change fields from current price and previous close.
    ///
    /// Returns (change, change_percent). A zero previous close yields 0%
    /// rather than dividing by zero.
    pub fn derive_changes(current_price: Decimal, previous_close: Decimal) -> (Decimal, Decimal) {
        let change = current_price - previous_close;
        let percent = if previous_close.is_zero() {
            Decimal::ZERO
        } else {
            change / previous_close * dec!(100)
        };
        (change, percent)
    }

    /// Fill in derived fields when the provider did not supply them.
    ///
    /// A snapshot whose prices differ but whose change is zero can only come
    /// from a provider that omitted the change fields, so recomputing here is
    /// safe for providers that did supply them.
    pub fn ensure_derived(mut self) -> Self {
        if self.day_change.is_zero() && self.current_price != self.previous_close {
            let (change, percent) =
                Self::derive_changes(self.current_price, self.previous_close);
            self.day_change = change;
            self.day_change_percent = percent;
        }
        self
    }

    /// RSI value, if the provider attached one
    pub fn rsi(&self) -> Option<Decimal> {
        self.technical.as_ref().and_then(|t| t.rsi)
    }
}
