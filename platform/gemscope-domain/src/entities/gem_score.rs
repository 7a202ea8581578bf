use crate::entities::feature_vector::Signal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GemTier {
    StrongBuy,
    Buy,
    ModerateBuy,
    Watch,
    Pass,
}

impl GemTier {
    pub fn from_probability(probability: f64) -> Self {
        if probability > 0.8 {
            GemTier::StrongBuy
        } else if probability > 0.7 {
            GemTier::Buy
        } else if probability > 0.6 {
            GemTier::ModerateBuy
        } else if probability > 0.4 {
            GemTier::Watch
        } else {
            GemTier::Pass
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalContribution {
    pub signal: Signal,
    pub value: f64,
    /// Signed push on the log-odds of being a gem.
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GemScore {
    pub gem_probability: f64,
    pub gem_score: u8,
    pub is_gem: bool,
    pub tier: GemTier,
    pub contributing_signals: Vec<SignalContribution>,
    /// How far the input sits from the training distribution, `[0, 1]`.
    pub novelty: f64,
}

impl GemScore {
    pub fn new(
        gem_probability: f64,
        gem_threshold: f64,
        contributing_signals: Vec<SignalContribution>,
        novelty: f64,
    ) -> Self {
        let gem_probability = if gem_probability.is_finite() {
            gem_probability.clamp(0.0, 1.0)
        } else {
            0.5
        };
        Self {
            gem_probability,
            gem_score: (gem_probability * 100.0).round() as u8,
            is_gem: gem_probability >= gem_threshold,
            tier: GemTier::from_probability(gem_probability),
            contributing_signals,
            novelty: if novelty.is_finite() {
                novelty.clamp(0.0, 1.0)
            } else {
                0.0
            },
        }
    }

    /// Distance of the probability from a coin flip, `[0.5, 1]`.
    pub fn confidence(&self) -> f64 {
        self.gem_probability.max(1.0 - self.gem_probability)
    }
}
