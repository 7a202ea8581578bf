use super::{SignalFamily, SignalInput};
use crate::entities::feature_vector::{FeatureVector, Signal};

/// Fundamentals that the price and the crowd ignore. Runs after the network,
/// smart-money and timing families and reads their outputs.
pub struct ContrarianFamily;

const SIGNALS: &[Signal] = &[Signal::DivergenceScore, Signal::MacroHeadwind];

impl SignalFamily for ContrarianFamily {
    fn name(&self) -> &'static str {
        "contrarian"
    }

    fn signals(&self) -> &'static [Signal] {
        SIGNALS
    }

    fn score(&self, input: &SignalInput<'_>, vector: &mut FeatureVector) {
        let divergence = divergence_score(input, vector);
        vector.set(Signal::DivergenceScore, divergence);
        vector.set(
            Signal::MacroHeadwind,
            input
                .context
                .macro_headwind()
                .unwrap_or(Signal::MacroHeadwind.neutral()),
        );
    }
}

fn rank_quality(input: &SignalInput<'_>) -> f64 {
    input
        .rank
        .map(|rank| (1.0 - f64::from(rank - 1) / f64::from(input.config.fear_max_rank)).max(0.0))
        .unwrap_or(0.5)
}

/// Sentiment in `[-1, 1]`: context value when supplied, else the 24h move.
fn sentiment(input: &SignalInput<'_>) -> f64 {
    input
        .context
        .sentiment()
        .or_else(|| input.change_24h.map(|c| (c / 20.0).tanh()))
        .unwrap_or(0.0)
}

/// `fundamentals / (|momentum| + eps) * inverse_sentiment`, squashed into
/// `[0, 1)` with `x / (1 + x)`.
fn divergence_score(input: &SignalInput<'_>, vector: &FeatureVector) -> f64 {
    if input.price.is_none() {
        return Signal::DivergenceScore.neutral();
    }
    let fundamentals = (vector.get(Signal::LiquidityDepth)
        + vector.get(Signal::InstitutionalInterest)
        + rank_quality(input))
        / 3.0;
    let momentum = vector.get(Signal::Momentum).abs();
    let inverse_sentiment = (1.0 - sentiment(input)) / 2.0;
    let raw = fundamentals / (momentum + input.config.divergence_epsilon) * inverse_sentiment;
    raw / (1.0 + raw)
}
