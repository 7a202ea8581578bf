use crate::value_objects::coin_snapshot::CoinSnapshot;

#[derive(Debug, Clone, PartialEq)]
pub struct MarketData {
    pub snapshot: CoinSnapshot,
    /// Bounded recent series for the same asset, oldest first.
    pub history: Vec<CoinSnapshot>,
}

pub trait MarketDataSource {
    fn get(&self, symbol: &str) -> Result<MarketData, String>;
}
