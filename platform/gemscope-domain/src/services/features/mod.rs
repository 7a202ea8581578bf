//! Alpha signal extraction: snapshot + bounded history (+ optional market
//! context) into a fixed-schema [`FeatureVector`].
//!
//! Extraction is stateless. Missing or invalid inputs degrade the affected
//! signals to their neutral values and set `low_confidence`; it never fails.

use crate::entities::feature_vector::{FeatureVector, Signal, SIGNAL_COUNT};
use crate::value_objects::coin_snapshot::CoinSnapshot;
use crate::value_objects::market_context::MarketContext;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

mod asymmetry;
mod contrarian;
pub mod input;
mod network;
mod psychology;
mod smart_money;
pub mod stats;
mod timing;

pub use asymmetry::AsymmetryFamily;
pub use contrarian::ContrarianFamily;
pub use input::SignalInput;
pub use network::NetworkFamily;
pub use psychology::PsychologyFamily;
pub use smart_money::SmartMoneyFamily;
pub use timing::TimingFamily;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VolumeTier {
    /// Applies to ranks strictly below this value.
    pub below_rank: u32,
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeatureConfig {
    pub max_history: usize,
    pub min_history: usize,
    pub fallback_expected_volume: f64,
    pub fear_drop_threshold_pct: f64,
    pub fear_full_drop_pct: f64,
    pub fear_max_rank: u32,
    pub surge_saturation_multiple: f64,
    pub surge_age_min_multiple: f64,
    pub surge_age_horizon: usize,
    pub momentum_scale_pct: f64,
    pub min_correlation_points: usize,
    pub divergence_epsilon: f64,
    /// Expected 24h volume by rank bracket, sorted by `below_rank`.
    pub volume_tiers: Vec<VolumeTier>,
    /// Fallback ecosystem beta by symbol when no ecosystem series is given.
    pub ecosystem_priors: BTreeMap<String, f64>,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        let ecosystem_priors = [
            ("UNI", 0.8),
            ("AAVE", 0.7),
            ("COMP", 0.6),
            ("MKR", 0.7),
            ("SNX", 0.6),
            ("CAKE", 0.7),
            ("BNB", 0.9),
            ("RAY", 0.6),
            ("MATIC", 0.8),
            ("AVAX", 0.8),
            ("JOE", 0.6),
            ("LRC", 0.6),
        ]
        .into_iter()
        .map(|(symbol, beta)| (symbol.to_string(), beta))
        .collect();

        Self {
            max_history: 30,
            min_history: 3,
            volume_tiers: vec![
                VolumeTier {
                    below_rank: 50,
                    volume: 50_000_000.0,
                },
                VolumeTier {
                    below_rank: 100,
                    volume: 20_000_000.0,
                },
                VolumeTier {
                    below_rank: 300,
                    volume: 5_000_000.0,
                },
                VolumeTier {
                    below_rank: 500,
                    volume: 1_000_000.0,
                },
            ],
            fallback_expected_volume: 100_000.0,
            fear_drop_threshold_pct: 15.0,
            fear_full_drop_pct: 20.0,
            fear_max_rank: 1_000,
            surge_saturation_multiple: 2.0,
            surge_age_min_multiple: 1.5,
            surge_age_horizon: 7,
            momentum_scale_pct: 25.0,
            min_correlation_points: 5,
            divergence_epsilon: 0.1,
            ecosystem_priors,
        }
    }
}

impl FeatureConfig {
    /// Expected 24h volume for a rank; non-increasing as rank grows.
    pub fn expected_volume(&self, rank: u32) -> f64 {
        self.volume_tiers
            .iter()
            .find(|tier| rank < tier.below_rank)
            .map(|tier| tier.volume)
            .unwrap_or(self.fallback_expected_volume)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_history == 0 {
            return Err("features.max_history must be > 0".to_string());
        }
        if self.fear_max_rank == 0 {
            return Err("features.fear_max_rank must be > 0".to_string());
        }
        for (name, value) in [
            ("fallback_expected_volume", self.fallback_expected_volume),
            ("fear_drop_threshold_pct", self.fear_drop_threshold_pct),
            ("fear_full_drop_pct", self.fear_full_drop_pct),
            ("surge_saturation_multiple", self.surge_saturation_multiple),
            ("surge_age_min_multiple", self.surge_age_min_multiple),
            ("momentum_scale_pct", self.momentum_scale_pct),
            ("divergence_epsilon", self.divergence_epsilon),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(format!("features.{name} must be > 0"));
            }
        }
        if self.surge_age_horizon == 0 {
            return Err("features.surge_age_horizon must be > 0".to_string());
        }
        let mut previous: Option<&VolumeTier> = None;
        for tier in &self.volume_tiers {
            if !(tier.volume.is_finite() && tier.volume > 0.0) {
                return Err("features.volume_tiers volumes must be > 0".to_string());
            }
            if let Some(prev) = previous {
                if tier.below_rank <= prev.below_rank {
                    return Err("features.volume_tiers must be sorted by below_rank".to_string());
                }
                if tier.volume > prev.volume {
                    return Err(
                        "features.volume_tiers volumes must not increase with rank".to_string()
                    );
                }
            }
            previous = Some(tier);
        }
        if let Some(last) = previous {
            if self.fallback_expected_volume > last.volume {
                return Err(
                    "features.fallback_expected_volume must not exceed the last tier".to_string(),
                );
            }
        }
        if let Some((symbol, _)) = self
            .ecosystem_priors
            .iter()
            .find(|(_, beta)| !(beta.is_finite() && (-1.0..=1.0).contains(*beta)))
        {
            return Err(format!(
                "features.ecosystem_priors.{symbol} must be within [-1, 1]"
            ));
        }
        Ok(())
    }
}

/// One independently testable group of signals.
///
/// Families run in the order given to the extractor and may read signals
/// written by earlier families from `vector`.
pub trait SignalFamily: Send + Sync {
    fn name(&self) -> &'static str;
    fn signals(&self) -> &'static [Signal];
    fn score(&self, input: &SignalInput<'_>, vector: &mut FeatureVector);
}

pub fn built_in_families() -> Vec<Box<dyn SignalFamily>> {
    vec![
        Box::new(PsychologyFamily),
        Box::new(TimingFamily),
        Box::new(SmartMoneyFamily),
        Box::new(NetworkFamily),
        Box::new(AsymmetryFamily),
        Box::new(ContrarianFamily),
    ]
}

pub struct AlphaFeatureExtractor {
    config: FeatureConfig,
    families: Vec<Box<dyn SignalFamily>>,
}

impl AlphaFeatureExtractor {
    pub fn new(config: FeatureConfig) -> Self {
        Self::with_families(config, built_in_families())
    }

    /// # Panics
    ///
    /// Panics when the families do not own every signal exactly once.
    pub fn with_families(config: FeatureConfig, families: Vec<Box<dyn SignalFamily>>) -> Self {
        let mut owners: [Option<&'static str>; SIGNAL_COUNT] = [None; SIGNAL_COUNT];
        for family in &families {
            for signal in family.signals() {
                if let Some(owner) = owners[signal.index()] {
                    panic!(
                        "signal `{}` is owned by both `{}` and `{}`",
                        signal.name(),
                        owner,
                        family.name()
                    );
                }
                owners[signal.index()] = Some(family.name());
            }
        }
        if let Some(signal) = Signal::ALL
            .into_iter()
            .find(|signal| owners[signal.index()].is_none())
        {
            panic!("signal `{}` has no owning family", signal.name());
        }
        Self { config, families }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    pub fn extract(&self, snapshot: &CoinSnapshot, history: &[CoinSnapshot]) -> FeatureVector {
        self.extract_with_context(snapshot, history, &MarketContext::neutral())
    }

    pub fn extract_with_context(
        &self,
        snapshot: &CoinSnapshot,
        history: &[CoinSnapshot],
        context: &MarketContext,
    ) -> FeatureVector {
        let input = SignalInput::new(&self.config, snapshot, history, context);
        let mut vector = FeatureVector::neutral();
        for family in &self.families {
            family.score(&input, &mut vector);
        }
        if input.is_low_confidence() {
            vector.mark_low_confidence();
        }
        vector
    }
}

impl Default for AlphaFeatureExtractor {
    fn default() -> Self {
        Self::new(FeatureConfig::default())
    }
}
