use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinSnapshot {
    pub symbol: String,
    pub price: f64,
    pub volume_24h: f64,
    pub market_cap: f64,
    pub market_cap_rank: Option<u32>,
    /// Percent, e.g. `-18.0` for an 18% drop.
    pub price_change_24h: f64,
    /// Epoch seconds.
    pub timestamp: i64,
}

impl CoinSnapshot {
    pub fn has_symbol(&self) -> bool {
        !self.symbol.trim().is_empty()
    }

    pub fn usable_price(&self) -> Option<f64> {
        (self.price.is_finite() && self.price > 0.0).then_some(self.price)
    }

    pub fn usable_volume(&self) -> Option<f64> {
        (self.volume_24h.is_finite() && self.volume_24h >= 0.0).then_some(self.volume_24h)
    }

    pub fn usable_market_cap(&self) -> Option<f64> {
        (self.market_cap.is_finite() && self.market_cap > 0.0).then_some(self.market_cap)
    }

    pub fn usable_rank(&self) -> Option<u32> {
        self.market_cap_rank.filter(|rank| *rank >= 1)
    }

    pub fn usable_change_24h(&self) -> Option<f64> {
        self.price_change_24h
            .is_finite()
            .then_some(self.price_change_24h.clamp(-100.0, 1_000.0))
    }

    /// Symbols compare case-insensitively; history rows may come from sources
    /// with different casing conventions.
    pub fn same_asset(&self, other: &CoinSnapshot) -> bool {
        self.symbol.trim().eq_ignore_ascii_case(other.symbol.trim())
    }

    pub fn symbol_key(&self) -> String {
        self.symbol.trim().to_ascii_uppercase()
    }
}

#[cfg(test)]
mod tests {
    use super::CoinSnapshot;

    fn snapshot(symbol: &str, price: f64) -> CoinSnapshot {
        CoinSnapshot {
            symbol: symbol.to_string(),
            price,
            volume_24h: 1_000.0,
            market_cap: 1_000_000.0,
            market_cap_rank: Some(10),
            price_change_24h: 1.0,
            timestamp: 0,
        }
    }

    #[test]
    fn rejects_non_finite_and_non_positive_prices() {
        assert_eq!(snapshot("ABC", f64::NAN).usable_price(), None);
        assert_eq!(snapshot("ABC", 0.0).usable_price(), None);
        assert_eq!(snapshot("ABC", -1.0).usable_price(), None);
        assert_eq!(snapshot("ABC", 2.5).usable_price(), Some(2.5));
    }

    #[test]
    fn rank_zero_is_treated_as_missing() {
        let mut snap = snapshot("ABC", 1.0);
        snap.market_cap_rank = Some(0);
        assert_eq!(snap.usable_rank(), None);
    }

    #[test]
    fn same_asset_ignores_case_and_whitespace() {
        assert!(snapshot("abc ", 1.0).same_asset(&snapshot("ABC", 2.0)));
        assert!(!snapshot("ABC", 1.0).same_asset(&snapshot("ABD", 1.0)));
        assert_eq!(snapshot(" abc", 1.0).symbol_key(), "ABC");
    }
}
