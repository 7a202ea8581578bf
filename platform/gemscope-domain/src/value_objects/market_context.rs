use serde::{Deserialize, Serialize};

/// Optional market-wide inputs. Every field defaults to "absent", which the
/// extractor maps to neutral signal values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketContext {
    /// Per-period returns (fractional) of the asset's declared ecosystem,
    /// oldest first, aligned to the tail of the asset's history.
    pub ecosystem_momentum: Vec<f64>,
    /// `[0, 1]`, 1 = strongest macro headwind.
    pub macro_headwind: Option<f64>,
    /// `[-1, 1]`, negative = risk-off regime.
    pub market_regime: Option<f64>,
    /// `[-1, 1]`, crowd sentiment (greed positive).
    pub sentiment: Option<f64>,
}

impl MarketContext {
    pub fn neutral() -> Self {
        Self::default()
    }

    pub fn macro_headwind(&self) -> Option<f64> {
        finite_clamped(self.macro_headwind, 0.0, 1.0)
    }

    pub fn market_regime(&self) -> Option<f64> {
        finite_clamped(self.market_regime, -1.0, 1.0)
    }

    pub fn sentiment(&self) -> Option<f64> {
        finite_clamped(self.sentiment, -1.0, 1.0)
    }

    pub fn ecosystem_returns(&self) -> Vec<f64> {
        self.ecosystem_momentum
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .collect()
    }
}

fn finite_clamped(value: Option<f64>, lo: f64, hi: f64) -> Option<f64> {
    value.filter(|v| v.is_finite()).map(|v| v.clamp(lo, hi))
}
