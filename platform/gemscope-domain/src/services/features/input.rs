use super::stats;
use super::FeatureConfig;
use crate::value_objects::coin_snapshot::CoinSnapshot;
use crate::value_objects::market_context::MarketContext;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryPoint {
    pub price: f64,
    pub volume: Option<f64>,
}

/// Sanitized view of one snapshot plus its history. Every field that failed
/// validation is `None`; signal families map `None` to neutral values.
#[derive(Debug, Clone)]
pub struct SignalInput<'a> {
    pub config: &'a FeatureConfig,
    pub context: &'a MarketContext,
    pub symbol: String,
    pub price: Option<f64>,
    pub volume: Option<f64>,
    pub market_cap: Option<f64>,
    pub rank: Option<u32>,
    pub change_24h: Option<f64>,
    pub history: Vec<HistoryPoint>,
    pub missing_fields: usize,
}

impl<'a> SignalInput<'a> {
    pub fn new(
        config: &'a FeatureConfig,
        snapshot: &CoinSnapshot,
        history: &[CoinSnapshot],
        context: &'a MarketContext,
    ) -> Self {
        let price = snapshot.usable_price();
        let volume = snapshot.usable_volume();
        let market_cap = snapshot.usable_market_cap();
        let rank = snapshot.usable_rank();
        let change_24h = snapshot.usable_change_24h();
        let missing_fields = [
            price.is_none(),
            volume.is_none(),
            market_cap.is_none(),
            rank.is_none(),
            change_24h.is_none(),
        ]
        .into_iter()
        .filter(|missing| *missing)
        .count();

        let mut rows: Vec<&CoinSnapshot> = history
            .iter()
            .filter(|row| row.same_asset(snapshot))
            .filter(|row| row.timestamp < snapshot.timestamp)
            .filter(|row| row.usable_price().is_some())
            .collect();
        rows.sort_by_key(|row| row.timestamp);
        rows.dedup_by_key(|row| row.timestamp);
        let skip = rows.len().saturating_sub(config.max_history);
        let history = rows
            .into_iter()
            .skip(skip)
            .filter_map(|row| {
                Some(HistoryPoint {
                    price: row.usable_price()?,
                    volume: row.usable_volume(),
                })
            })
            .collect();

        Self {
            config,
            context,
            symbol: snapshot.symbol_key(),
            price,
            volume,
            market_cap,
            rank,
            change_24h,
            history,
            missing_fields,
        }
    }

    pub fn is_low_confidence(&self) -> bool {
        self.missing_fields > 0 || self.history.len() < self.config.min_history
    }

    pub fn expected_volume(&self) -> Option<f64> {
        self.rank.map(|rank| self.config.expected_volume(rank))
    }

    pub fn volume_to_market_cap(&self) -> Option<f64> {
        match (self.volume, self.market_cap) {
            (Some(volume), Some(market_cap)) => Some(volume / market_cap),
            _ => None,
        }
    }

    /// Prices of the history window followed by the current price.
    pub fn price_path(&self) -> Vec<f64> {
        let mut path: Vec<f64> = self.history.iter().map(|point| point.price).collect();
        if let Some(price) = self.price {
            path.push(price);
        }
        path
    }

    pub fn returns(&self) -> Vec<f64> {
        stats::simple_returns(&self.price_path())
    }

    /// Percent move over the history window, falling back to the 24h change.
    pub fn momentum_pct(&self) -> Option<f64> {
        match (self.history.first(), self.price) {
            (Some(first), Some(price)) if first.price > 0.0 => {
                Some((price / first.price - 1.0) * 100.0)
            }
            _ => self.change_24h,
        }
    }

    /// Decline from the highest price in the window, as a fraction.
    pub fn drawdown_from_peak(&self) -> Option<f64> {
        let price = self.price?;
        let peak = self
            .history
            .iter()
            .map(|point| point.price)
            .fold(price, f64::max);
        (peak > 0.0).then(|| (peak - price) / peak)
    }
}

#[cfg(test)]
mod tests {
    use super::SignalInput;
    use crate::services::features::FeatureConfig;
    use crate::value_objects::coin_snapshot::CoinSnapshot;
    use crate::value_objects::market_context::MarketContext;

    fn snap(symbol: &str, ts: i64, price: f64) -> CoinSnapshot {
        CoinSnapshot {
            symbol: symbol.to_string(),
            price,
            volume_24h: 1_000.0,
            market_cap: 100_000.0,
            market_cap_rank: Some(120),
            price_change_24h: 0.0,
            timestamp: ts,
        }
    }

    #[test]
    fn history_is_filtered_sorted_and_bounded() {
        let config = FeatureConfig {
            max_history: 3,
            ..FeatureConfig::default()
        };
        let ctx = MarketContext::neutral();
        let history = vec![
            snap("abc", 4, 4.0),
            snap("ABC", 1, 1.0),
            snap("XYZ", 2, 99.0),
            snap("ABC", 3, 3.0),
            snap("ABC", 2, 2.0),
            snap("ABC", 5, f64::NAN),
            snap("ABC", 10, 10.0),
        ];
        let input = SignalInput::new(&config, &snap("ABC", 6, 6.0), &history, &ctx);
        let prices: Vec<f64> = input.history.iter().map(|p| p.price).collect();
        assert_eq!(prices, vec![2.0, 3.0, 4.0]);
        assert_eq!(input.price_path(), vec![2.0, 3.0, 4.0, 6.0]);
        assert!((input.momentum_pct().expect("momentum") - 200.0).abs() < 1e-9);
    }

    #[test]
    fn missing_fields_and_short_history_mark_low_confidence() {
        let config = FeatureConfig::default();
        let ctx = MarketContext::neutral();
        let mut snapshot = snap("ABC", 6, 6.0);
        snapshot.market_cap_rank = None;
        let input = SignalInput::new(&config, &snapshot, &[], &ctx);
        assert_eq!(input.missing_fields, 1);
        assert!(input.is_low_confidence());
        assert_eq!(input.expected_volume(), None);
    }

    #[test]
    fn drawdown_measures_decline_from_window_peak() {
        let config = FeatureConfig::default();
        let ctx = MarketContext::neutral();
        let history = vec![snap("ABC", 1, 10.0), snap("ABC", 2, 8.0)];
        let input = SignalInput::new(&config, &snap("ABC", 3, 6.0), &history, &ctx);
        assert!((input.drawdown_from_peak().expect("drawdown") - 0.4).abs() < 1e-9);
    }
}
