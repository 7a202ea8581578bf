use super::stats;
use super::{SignalFamily, SignalInput};
use crate::entities::feature_vector::{FeatureVector, Signal};

pub struct NetworkFamily;

const SIGNALS: &[Signal] = &[Signal::EcosystemBeta, Signal::LiquidityDepth];

impl SignalFamily for NetworkFamily {
    fn name(&self) -> &'static str {
        "network"
    }

    fn signals(&self) -> &'static [Signal] {
        SIGNALS
    }

    fn score(&self, input: &SignalInput<'_>, vector: &mut FeatureVector) {
        vector.set(Signal::EcosystemBeta, ecosystem_beta(input));
        vector.set(
            Signal::LiquidityDepth,
            input
                .volume
                .map(|volume| ((volume + 1.0).log10() / 10.0).min(1.0))
                .unwrap_or(Signal::LiquidityDepth.neutral()),
        );
    }
}

/// Measured co-movement with the declared ecosystem series; configured prior
/// when there is not enough overlap to measure it.
fn ecosystem_beta(input: &SignalInput<'_>) -> f64 {
    let ecosystem = input.context.ecosystem_returns();
    let measured = stats::tail_correlation(
        &input.returns(),
        &ecosystem,
        input.config.min_correlation_points,
    );
    measured
        .or_else(|| input.config.ecosystem_priors.get(&input.symbol).copied())
        .unwrap_or(Signal::EcosystemBeta.neutral())
}
