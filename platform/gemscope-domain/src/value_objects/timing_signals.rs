use serde::{Deserialize, Serialize};

/// Volume over the rank-tier expectation above which entry is immediate.
pub const SURGE_RATIO: f64 = 3.0;
/// 24h change (percent) above which momentum counts as strong.
pub const MOMENTUM_CHANGE: f64 = 10.0;
/// 24h change (percent) below which entry waits for the dip to settle.
pub const DIP_CHANGE: f64 = -5.0;
/// Sentiment magnitude past which the crowd counts as bullish or bearish.
pub const SENTIMENT_BAND: f64 = 0.2;

const BASE_SCORE: f64 = 0.5;

/// Entry-timing hints attached to a live recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimingSignals {
    pub immediate_entry: bool,
    pub wait_for_dip: bool,
    pub strong_momentum: bool,
    /// `[0, 1]`, 0.5 when nothing is known.
    pub timing_score: f64,
}

impl Default for TimingSignals {
    fn default() -> Self {
        Self {
            immediate_entry: false,
            wait_for_dip: false,
            strong_momentum: false,
            timing_score: BASE_SCORE,
        }
    }
}

impl TimingSignals {
    /// `volume_ratio` is 24h volume over the expected volume for the rank
    /// tier, `change_24h` is in percent and `sentiment` in `[-1, 1]`.
    /// Missing or non-finite inputs contribute nothing.
    pub fn assess(
        volume_ratio: Option<f64>,
        change_24h: Option<f64>,
        sentiment: Option<f64>,
    ) -> Self {
        let mut signals = Self::default();
        let mut score = BASE_SCORE;

        if finite(volume_ratio).is_some_and(|ratio| ratio > SURGE_RATIO) {
            signals.strong_momentum = true;
            signals.immediate_entry = true;
            score += 0.2;
        }

        match finite(change_24h) {
            Some(change) if change > MOMENTUM_CHANGE => {
                signals.strong_momentum = true;
                score += 0.15;
            }
            Some(change) if change < DIP_CHANGE => {
                signals.wait_for_dip = true;
                score += 0.1;
            }
            _ => {}
        }

        match finite(sentiment) {
            Some(s) if s > SENTIMENT_BAND => score += 0.1,
            Some(s) if s < -SENTIMENT_BAND => score -= 0.1,
            _ => {}
        }

        signals.timing_score = score.clamp(0.0, 1.0);
        signals
    }
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}
