use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const SIGNAL_COUNT: usize = 19;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    FearOpportunity,
    NeglectOpportunity,
    AntiHerdMomentum,
    RetailExhaustion,
    VolumeSurge,
    QuietAccumulation,
    SurgeAge,
    Momentum,
    WhaleAccumulation,
    InstitutionalInterest,
    VolumeToMarketCap,
    EcosystemBeta,
    LiquidityDepth,
    DownsideProtection,
    UpsideLeverage,
    Antifragility,
    AsymmetricScore,
    DivergenceScore,
    MacroHeadwind,
}

impl Signal {
    pub const ALL: [Signal; SIGNAL_COUNT] = [
        Signal::FearOpportunity,
        Signal::NeglectOpportunity,
        Signal::AntiHerdMomentum,
        Signal::RetailExhaustion,
        Signal::VolumeSurge,
        Signal::QuietAccumulation,
        Signal::SurgeAge,
        Signal::Momentum,
        Signal::WhaleAccumulation,
        Signal::InstitutionalInterest,
        Signal::VolumeToMarketCap,
        Signal::EcosystemBeta,
        Signal::LiquidityDepth,
        Signal::DownsideProtection,
        Signal::UpsideLeverage,
        Signal::Antifragility,
        Signal::AsymmetricScore,
        Signal::DivergenceScore,
        Signal::MacroHeadwind,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Signal::FearOpportunity => "fear_opportunity",
            Signal::NeglectOpportunity => "neglect_opportunity",
            Signal::AntiHerdMomentum => "anti_herd_momentum",
            Signal::RetailExhaustion => "retail_exhaustion",
            Signal::VolumeSurge => "volume_surge",
            Signal::QuietAccumulation => "quiet_accumulation",
            Signal::SurgeAge => "surge_age",
            Signal::Momentum => "momentum",
            Signal::WhaleAccumulation => "whale_accumulation",
            Signal::InstitutionalInterest => "institutional_interest",
            Signal::VolumeToMarketCap => "volume_to_market_cap",
            Signal::EcosystemBeta => "ecosystem_beta",
            Signal::LiquidityDepth => "liquidity_depth",
            Signal::DownsideProtection => "downside_protection",
            Signal::UpsideLeverage => "upside_leverage",
            Signal::Antifragility => "antifragility",
            Signal::AsymmetricScore => "asymmetric_score",
            Signal::DivergenceScore => "divergence_score",
            Signal::MacroHeadwind => "macro_headwind",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|signal| signal.name() == name)
    }

    pub fn range(self) -> (f64, f64) {
        match self {
            Signal::Momentum | Signal::EcosystemBeta => (-1.0, 1.0),
            _ => (0.0, 1.0),
        }
    }

    /// Value used when inputs are missing or invalid.
    pub fn neutral(self) -> f64 {
        match self {
            Signal::AntiHerdMomentum
            | Signal::RetailExhaustion
            | Signal::QuietAccumulation
            | Signal::InstitutionalInterest => 0.2,
            Signal::WhaleAccumulation | Signal::DownsideProtection | Signal::UpsideLeverage => 0.3,
            Signal::Antifragility => 0.5,
            Signal::AsymmetricScore => (0.3f64 * 0.3 * 0.5).cbrt(),
            _ => 0.0,
        }
    }
}

/// Fixed-schema signal vector: one slot per [`Signal`], always populated and
/// always inside the signal's range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "FeatureVectorRepr", try_from = "FeatureVectorRepr")]
pub struct FeatureVector {
    values: [f64; SIGNAL_COUNT],
    low_confidence: bool,
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self::neutral()
    }
}

impl FeatureVector {
    pub fn neutral() -> Self {
        let mut values = [0.0; SIGNAL_COUNT];
        for signal in Signal::ALL {
            values[signal.index()] = signal.neutral();
        }
        Self {
            values,
            low_confidence: false,
        }
    }

    pub fn from_values(values: [f64; SIGNAL_COUNT], low_confidence: bool) -> Self {
        let mut vector = Self::neutral();
        for signal in Signal::ALL {
            vector.set(signal, values[signal.index()]);
        }
        vector.low_confidence = low_confidence;
        vector
    }

    pub fn get(&self, signal: Signal) -> f64 {
        self.values[signal.index()]
    }

    /// Non-finite values fall back to the neutral value; the rest are clamped.
    pub fn set(&mut self, signal: Signal, value: f64) {
        let (lo, hi) = signal.range();
        self.values[signal.index()] = if value.is_finite() {
            value.clamp(lo, hi)
        } else {
            signal.neutral()
        };
    }

    pub fn values(&self) -> &[f64; SIGNAL_COUNT] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (Signal, f64)> + '_ {
        Signal::ALL.into_iter().map(|signal| (signal, self.get(signal)))
    }

    pub fn low_confidence(&self) -> bool {
        self.low_confidence
    }

    pub fn mark_low_confidence(&mut self) {
        self.low_confidence = true;
    }

    pub fn is_within_ranges(&self) -> bool {
        self.iter().all(|(signal, value)| {
            let (lo, hi) = signal.range();
            value.is_finite() && value >= lo && value <= hi
        })
    }
}

#[derive(Serialize, Deserialize)]
struct FeatureVectorRepr {
    signals: BTreeMap<String, f64>,
    low_confidence: bool,
}

impl From<FeatureVector> for FeatureVectorRepr {
    fn from(vector: FeatureVector) -> Self {
        Self {
            signals: vector
                .iter()
                .map(|(signal, value)| (signal.name().to_string(), value))
                .collect(),
            low_confidence: vector.low_confidence,
        }
    }
}

impl TryFrom<FeatureVectorRepr> for FeatureVector {
    type Error = String;

    fn try_from(repr: FeatureVectorRepr) -> Result<Self, Self::Error> {
        let mut values = [0.0; SIGNAL_COUNT];
        for signal in Signal::ALL {
            values[signal.index()] = *repr
                .signals
                .get(signal.name())
                .ok_or_else(|| format!("feature vector is missing signal `{}`", signal.name()))?;
        }
        if let Some(unknown) = repr
            .signals
            .keys()
            .find(|name| Signal::from_name(name).is_none())
        {
            return Err(format!("feature vector has unknown signal `{unknown}`"));
        }
        Ok(FeatureVector::from_values(values, repr.low_confidence))
    }
}
