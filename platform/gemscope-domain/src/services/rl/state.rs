use crate::entities::feature_vector::{FeatureVector, SIGNAL_COUNT};
use serde::{Deserialize, Serialize};

/// Signals followed by the gem probability and the market regime indicator.
pub const STATE_LEN: usize = SIGNAL_COUNT + 2;

const GEM_PROBABILITY: usize = SIGNAL_COUNT;
const MARKET_REGIME: usize = SIGNAL_COUNT + 1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RlState {
    values: [f64; STATE_LEN],
}

impl RlState {
    pub fn new(features: &FeatureVector, gem_probability: f64, market_regime: f64) -> Self {
        let mut values = [0.0; STATE_LEN];
        values[..SIGNAL_COUNT].copy_from_slice(features.values());
        values[GEM_PROBABILITY] = finite_or(gem_probability, 0.5).clamp(0.0, 1.0);
        values[MARKET_REGIME] = finite_or(market_regime, 0.0).clamp(-1.0, 1.0);
        Self { values }
    }

    pub fn neutral() -> Self {
        Self::new(&FeatureVector::neutral(), 0.5, 0.0)
    }

    /// Builds a state from raw values; non-finite entries become 0 and all
    /// entries are clamped to `[-1, 1]`.
    pub fn from_values(values: [f64; STATE_LEN]) -> Self {
        let mut clean = [0.0; STATE_LEN];
        for (slot, value) in clean.iter_mut().zip(values) {
            *slot = finite_or(value, 0.0).clamp(-1.0, 1.0);
        }
        Self { values: clean }
    }

    pub fn values(&self) -> &[f64; STATE_LEN] {
        &self.values
    }

    pub fn gem_probability(&self) -> f64 {
        self.values[GEM_PROBABILITY]
    }

    pub fn market_regime(&self) -> f64 {
        self.values[MARKET_REGIME]
    }
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}
