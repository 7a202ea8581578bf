use gemscope_domain::entities::feature_vector::{FeatureVector, Signal};
use gemscope_domain::entities::gem_score::GemScore;
use gemscope_domain::services::features::FeatureConfig;
use gemscope_domain::value_objects::action::{ActionKind, RlAction};
use gemscope_domain::value_objects::coin_snapshot::CoinSnapshot;
use gemscope_domain::value_objects::market_context::MarketContext;
use gemscope_domain::value_objects::timing_signals::TimingSignals;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFlag {
    ModelUntrained,
    NotTrained,
    /// Too few usable inputs; most signals sit at their neutral values.
    LowConfidence,
    NoveltyDampened,
    HeadwindDampened,
    LateSurgeDampened,
}

impl StatusFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusFlag::ModelUntrained => "model_untrained",
            StatusFlag::NotTrained => "not_trained",
            StatusFlag::LowConfidence => "low_confidence",
            StatusFlag::NoveltyDampened => "novelty_dampened",
            StatusFlag::HeadwindDampened => "headwind_dampened",
            StatusFlag::LateSurgeDampened => "late_surge_dampened",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub risk_factors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RlRecommendation {
    pub action: RlAction,
    /// `not_trained` while the agent is not READY.
    pub flag: Option<StatusFlag>,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub symbol: String,
    pub model_version: u64,
    pub gem_score: GemScore,
    /// `ready` or `model_untrained`.
    pub gem_status: String,
    pub rl_recommendation: RlRecommendation,
    pub combined_confidence: f64,
    pub risk_assessment: RiskAssessment,
    pub timing_signals: TimingSignals,
    pub features: FeatureVector,
    pub flags: Vec<StatusFlag>,
}

impl Recommendation {
    pub fn has_flag(&self, flag: StatusFlag) -> bool {
        self.flags.contains(&flag)
    }
}

const MICRO_CAP: f64 = 10_000_000.0;
const SMALL_CAP: f64 = 100_000_000.0;
const THIN_VOLUME: f64 = 100_000.0;

/// Additive risk score starting at 0.5, capped at 1.
pub fn assess_risk(snapshot: &CoinSnapshot, gem: &GemScore, rl_confidence: f64) -> RiskAssessment {
    let mut score: f64 = 0.5;
    let mut factors = Vec::new();

    match snapshot.usable_market_cap() {
        Some(cap) if cap < MICRO_CAP => {
            score += 0.2;
            factors.push("micro market cap (< $10M)".to_string());
        }
        Some(cap) if cap < SMALL_CAP => {
            score += 0.1;
            factors.push("small market cap (< $100M)".to_string());
        }
        _ => {}
    }
    if snapshot.usable_volume().is_some_and(|v| v < THIN_VOLUME) {
        score += 0.15;
        factors.push("thin 24h volume (< $100K)".to_string());
    }
    if rl_confidence < 0.5 {
        score += 0.1;
        factors.push("low RL confidence".to_string());
    }
    if gem.gem_score < 50 {
        score += 0.1;
        factors.push("gem score below 50".to_string());
    }

    let risk_score = score.min(1.0);
    let risk_level = if risk_score > 0.7 {
        RiskLevel::High
    } else if risk_score > 0.4 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };
    RiskAssessment {
        risk_score,
        risk_level,
        risk_factors: factors,
    }
}

/// Entry timing from the 24h volume against the rank-tier expectation, the
/// 24h change and crowd sentiment. Unranked assets use the fallback tier.
pub fn entry_timing(
    snapshot: &CoinSnapshot,
    features: &FeatureConfig,
    context: &MarketContext,
) -> TimingSignals {
    let expected = snapshot
        .usable_rank()
        .map_or(features.fallback_expected_volume, |rank| features.expected_volume(rank));
    let volume_ratio = snapshot
        .usable_volume()
        .filter(|_| expected > 0.0)
        .map(|volume| volume / expected);
    TimingSignals::assess(volume_ratio, snapshot.usable_change_24h(), context.sentiment())
}

/// Buy size scaled by conviction and risk; zero for HOLD/AVOID.
pub fn position_size(
    action: &RlAction,
    gem_probability: f64,
    risk_score: f64,
    min_percent: f64,
    max_percent: f64,
) -> f64 {
    if action.kind != ActionKind::Buy {
        return 0.0;
    }
    let raw = action.position_size_percent * gem_probability * (1.0 - 0.5 * risk_score);
    if raw.is_finite() {
        raw.clamp(min_percent, max_percent)
    } else {
        min_percent
    }
}

pub fn reasoning(action: &RlAction, gem: &GemScore, features: &FeatureVector, rl_ready: bool) -> String {
    if !rl_ready {
        return format!(
            "RL agent not trained; classifier-only view (gem score {})",
            gem.gem_score
        );
    }
    let mut factors = Vec::new();
    if gem.gem_score > 80 {
        factors.push(format!("high gem score ({})", gem.gem_score));
    } else if gem.gem_score < 40 {
        factors.push(format!("low gem score ({})", gem.gem_score));
    }
    for (signal, label) in [
        (Signal::FearOpportunity, "strong fear opportunity"),
        (Signal::VolumeSurge, "volume surge"),
        (Signal::WhaleAccumulation, "whale accumulation"),
    ] {
        if features.get(signal) > 0.7 {
            factors.push(label.to_string());
        }
    }

    let mut text = format!(
        "{} with confidence {:.2}",
        action.kind.as_str(),
        action.confidence
    );
    if !factors.is_empty() {
        text.push_str("; key factors: ");
        text.push_str(&factors.join(", "));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::{assess_risk, entry_timing, position_size, RiskLevel};
    use gemscope_domain::entities::gem_score::GemScore;
    use gemscope_domain::services::features::FeatureConfig;
    use gemscope_domain::value_objects::action::{ActionKind, RlAction};
    use gemscope_domain::value_objects::coin_snapshot::CoinSnapshot;
    use gemscope_domain::value_objects::market_context::MarketContext;

    fn snapshot(market_cap: f64, volume: f64) -> CoinSnapshot {
        CoinSnapshot {
            symbol: "ABC".to_string(),
            price: 1.0,
            volume_24h: volume,
            market_cap,
            market_cap_rank: Some(700),
            price_change_24h: 0.0,
            timestamp: 0,
        }
    }

    #[test]
    fn risk_factors_accumulate_and_cap() {
        let gem = GemScore::new(0.3, 0.6, vec![], 0.0);
        let risk = assess_risk(&snapshot(5_000_000.0, 50_000.0), &gem, 0.2);
        assert_eq!(risk.risk_score, 1.0);
        assert_eq!(risk.risk_level, RiskLevel::High);
        assert_eq!(risk.risk_factors.len(), 4);
    }

    #[test]
    fn established_asset_with_confident_model_is_medium() {
        let gem = GemScore::new(0.8, 0.6, vec![], 0.0);
        let risk = assess_risk(&snapshot(2_000_000_000.0, 50_000_000.0), &gem, 0.9);
        assert_eq!(risk.risk_score, 0.5);
        assert_eq!(risk.risk_level, RiskLevel::Medium);
        assert!(risk.risk_factors.is_empty());
    }

    #[test]
    fn only_buys_get_a_position() {
        let buy = RlAction::new(ActionKind::Buy, 8.0, 0.9);
        let size = position_size(&buy, 0.75, 0.5, 0.5, 10.0);
        assert!((size - 8.0 * 0.75 * 0.75).abs() < 1e-12);
        assert_eq!(position_size(&buy, 0.01, 1.0, 0.5, 10.0), 0.5);

        let hold = RlAction::hold();
        assert_eq!(position_size(&hold, 0.9, 0.0, 0.5, 10.0), 0.0);
    }

    #[test]
    fn timing_uses_the_rank_tier_volume() {
        let config = FeatureConfig::default();
        let mut snap = snapshot(50_000_000.0, 4.0 * config.expected_volume(700));
        snap.price_change_24h = 12.0;
        let bullish = MarketContext {
            sentiment: Some(0.5),
            ..MarketContext::default()
        };
        let timing = entry_timing(&snap, &config, &bullish);
        assert!(timing.immediate_entry);
        assert!(timing.strong_momentum);
        assert!((timing.timing_score - 0.95).abs() < 1e-12);
    }

    #[test]
    fn unranked_dip_falls_back_and_waits() {
        let config = FeatureConfig::default();
        let mut snap = snapshot(50_000_000.0, config.fallback_expected_volume);
        snap.market_cap_rank = None;
        snap.price_change_24h = -9.0;
        let timing = entry_timing(&snap, &config, &MarketContext::default());
        assert!(!timing.immediate_entry);
        assert!(timing.wait_for_dip);
        assert!((timing.timing_score - 0.6).abs() < 1e-12);
    }
}
