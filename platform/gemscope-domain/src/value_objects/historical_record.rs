use crate::value_objects::coin_snapshot::CoinSnapshot;
use crate::value_objects::market_context::MarketContext;
use serde::{Deserialize, Serialize};

/// One labeled point in the past: what the market looked like at
/// `snapshot.timestamp` and how the price evolved afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRecord {
    pub snapshot: CoinSnapshot,
    #[serde(default)]
    pub history: Vec<CoinSnapshot>,
    /// One closing price per day after the snapshot, oldest first.
    pub forward_prices: Vec<f64>,
    #[serde(default)]
    pub context: Option<MarketContext>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordIssue {
    MissingSymbol,
    InvalidPrice,
    ForwardPathTooShort,
    InvalidForwardPrice,
}

impl RecordIssue {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordIssue::MissingSymbol => "missing_symbol",
            RecordIssue::InvalidPrice => "invalid_price",
            RecordIssue::ForwardPathTooShort => "forward_path_too_short",
            RecordIssue::InvalidForwardPrice => "invalid_forward_price",
        }
    }
}

impl HistoricalRecord {
    pub fn validate(&self, horizon_days: usize) -> Result<(), RecordIssue> {
        if !self.snapshot.has_symbol() {
            return Err(RecordIssue::MissingSymbol);
        }
        if self.snapshot.usable_price().is_none() {
            return Err(RecordIssue::InvalidPrice);
        }
        if self.forward_prices.len() < horizon_days.max(1) {
            return Err(RecordIssue::ForwardPathTooShort);
        }
        if self
            .forward_prices
            .iter()
            .any(|price| !(price.is_finite() && *price > 0.0))
        {
            return Err(RecordIssue::InvalidForwardPrice);
        }
        Ok(())
    }

    pub fn context_or_neutral(&self) -> MarketContext {
        self.context.clone().unwrap_or_default()
    }
}
