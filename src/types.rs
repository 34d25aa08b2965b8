//! Shared data model used by every pipeline stage.

use serde::{Deserialize, Serialize};

/// One raw (timestamp, price) observation from the feed.
///
/// Created per inbound message and consumed immediately by the bucket
/// aggregator; never persisted. The price stays a decimal string until the
/// aggregator parses it, so a malformed price is a per-tick decode error
/// rather than a deserialization failure for the whole message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    #[serde(rename = "tradeTimeMillis")]
    pub trade_time_ms: i64,
    pub price: String,
}

/// Price statistics for one fixed-length time bucket.
///
/// The empty (unpopulated) state is a canonical sentinel: `min = +INF`,
/// `max = -INF`, `first = last = NaN`, both times zero. Emptiness is tested
/// with `is_nan()` on the NaN fields, never `==`.
#[derive(Debug, Clone, Copy)]
pub struct BucketSummary {
    pub first_time_ms: i64,
    pub last_time_ms: i64,
    pub first: f64,
    pub last: f64,
    pub min: f64,
    pub max: f64,
}

impl BucketSummary {
    pub fn empty() -> Self {
        Self {
            first_time_ms: 0,
            last_time_ms: 0,
            first: f64::NAN,
            last: f64::NAN,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.first_time_ms == 0
            && self.last_time_ms == 0
            && self.first.is_nan()
            && self.last.is_nan()
            && self.min == f64::INFINITY
            && self.max == f64::NEG_INFINITY
    }

    pub fn reset(&mut self) {
        *self = Self::empty();
    }

    /// Folds one accepted tick into the bucket. The first* fields are fixed
    /// at the first update; last*/min/max track every update.
    pub fn update(&mut self, time_ms: i64, price: f64) {
        if self.is_empty() {
            self.first_time_ms = time_ms;
            self.first = price;
        }
        self.last_time_ms = time_ms;
        self.last = price;
        if self.min > price {
            self.min = price;
        }
        if self.max < price {
            self.max = price;
        }
    }
}

impl Default for BucketSummary {
    fn default() -> Self {
        Self::empty()
    }
}

/// Trade action emitted on a moving-average crossover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Buy,
    Sell,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Buy => "BUY",
            Signal::Sell => "SELL",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "BUY" => Some(Signal::Buy),
            "SELL" => Some(Signal::Sell),
            _ => None,
        }
    }
}

/// Persisted crossover event: the price that triggered it plus both averages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeSignal {
    pub time_ms: i64,
    pub signal: Signal,
    pub price: f64,
    pub sma_short: f64,
    pub sma_long: f64,
}

/// Persisted short/long moving-average pair for one bucket close.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmaSnapshot {
    pub time_ms: i64,
    pub sma_short: f64,
    pub sma_long: f64,
}
