use crate::errors::InputDataError;
use serde::{Deserialize, Serialize};

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub symbol: String,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_timestamp: i64,
    pub exit_timestamp: i64,
    pub days_held: u32,
    pub profit_loss_percent: f64,
    /// Peak-to-trough decline while the position was open, in percent (>= 0).
    pub max_drawdown_percent: f64,
}

impl TradeOutcome {
    /// Builds the outcome of holding from `entry_price` through one price per
    /// day in `path`. Returns `None` for an empty path or unusable prices.
    pub fn from_price_path(
        symbol: &str,
        entry_timestamp: i64,
        entry_price: f64,
        path: &[f64],
    ) -> Option<Self> {
        if !(entry_price.is_finite() && entry_price > 0.0) {
            return None;
        }
        if path.is_empty() || path.iter().any(|p| !(p.is_finite() && *p > 0.0)) {
            return None;
        }
        let exit_price = *path.last()?;
        let days_held = u32::try_from(path.len()).ok()?;
        Some(Self {
            symbol: symbol.trim().to_string(),
            entry_price,
            exit_price,
            entry_timestamp,
            exit_timestamp: entry_timestamp + i64::from(days_held) * SECONDS_PER_DAY,
            days_held,
            profit_loss_percent: (exit_price / entry_price - 1.0) * 100.0,
            max_drawdown_percent: max_drawdown_percent(entry_price, path),
        })
    }

    pub fn validate(&self) -> Result<(), InputDataError> {
        if self.symbol.trim().is_empty() {
            return Err(InputDataError("trade outcome symbol is empty".to_string()));
        }
        for (field, value) in [
            ("entry_price", self.entry_price),
            ("exit_price", self.exit_price),
            ("profit_loss_percent", self.profit_loss_percent),
            ("max_drawdown_percent", self.max_drawdown_percent),
        ] {
            if !value.is_finite() {
                return Err(InputDataError(format!("{field} must be finite")));
            }
        }
        if self.entry_price <= 0.0 || self.exit_price <= 0.0 {
            return Err(InputDataError("prices must be > 0".to_string()));
        }
        if self.exit_timestamp < self.entry_timestamp {
            return Err(InputDataError(
                "exit_timestamp precedes entry_timestamp".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_win(&self) -> bool {
        self.profit_loss_percent > 0.0
    }
}

/// Largest peak-to-trough decline along `entry` followed by `path`, in percent.
pub fn max_drawdown_percent(entry: f64, path: &[f64]) -> f64 {
    let mut peak = entry;
    let mut worst = 0.0f64;
    for price in path.iter().copied() {
        if price > peak {
            peak = price;
        } else if peak > 0.0 {
            worst = worst.max((peak - price) / peak);
        }
    }
    worst * 100.0
}

#[cfg(test)]
mod tests {
    use super::{max_drawdown_percent, TradeOutcome};

    #[test]
    fn builds_outcome_from_daily_path() {
        let outcome =
            TradeOutcome::from_price_path("abc", 1_000, 10.0, &[9.0, 12.0, 11.0]).expect("outcome");
        assert_eq!(outcome.days_held, 3);
        assert_eq!(outcome.exit_timestamp, 1_000 + 3 * 86_400);
        assert!((outcome.profit_loss_percent - 10.0).abs() < 1e-9);
        assert!((outcome.max_drawdown_percent - 10.0).abs() < 1e-9);
        assert!(outcome.is_win());
    }

    #[test]
    fn drawdown_uses_running_peak() {
        let dd = max_drawdown_percent(100.0, &[120.0, 90.0, 130.0, 117.0]);
        assert!((dd - 25.0).abs() < 1e-9);
        assert_eq!(max_drawdown_percent(100.0, &[101.0, 102.0]), 0.0);
    }

    #[test]
    fn rejects_empty_or_invalid_paths() {
        assert!(TradeOutcome::from_price_path("abc", 0, 10.0, &[]).is_none());
        assert!(TradeOutcome::from_price_path("abc", 0, 10.0, &[f64::NAN]).is_none());
        assert!(TradeOutcome::from_price_path("abc", 0, 0.0, &[1.0]).is_none());
    }

    #[test]
    fn validate_flags_non_finite_fields() {
        let mut outcome =
            TradeOutcome::from_price_path("abc", 0, 10.0, &[11.0]).expect("outcome");
        assert!(outcome.validate().is_ok());
        outcome.profit_loss_percent = f64::NAN;
        let err = outcome.validate().expect_err("nan should be rejected");
        assert!(err.to_string().contains("profit_loss_percent"));
    }
}
