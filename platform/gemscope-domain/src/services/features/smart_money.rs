use super::stats;
use super::{SignalFamily, SignalInput};
use crate::entities::feature_vector::{FeatureVector, Signal};

pub struct SmartMoneyFamily;

const SIGNALS: &[Signal] = &[
    Signal::WhaleAccumulation,
    Signal::InstitutionalInterest,
    Signal::VolumeToMarketCap,
];

impl SignalFamily for SmartMoneyFamily {
    fn name(&self) -> &'static str {
        "smart_money"
    }

    fn signals(&self) -> &'static [Signal] {
        SIGNALS
    }

    fn score(&self, input: &SignalInput<'_>, vector: &mut FeatureVector) {
        vector.set(Signal::WhaleAccumulation, whale_accumulation(input));
        vector.set(Signal::InstitutionalInterest, institutional_interest(input));
        vector.set(
            Signal::VolumeToMarketCap,
            input
                .volume_to_market_cap()
                .map(|ratio| (ratio * 10.0).min(1.0))
                .unwrap_or(Signal::VolumeToMarketCap.neutral()),
        );
    }
}

/// Per-period price impact: realized return volatility when history allows,
/// otherwise the absolute 24h move.
fn price_impact(input: &SignalInput<'_>) -> Option<f64> {
    let returns = input.returns();
    stats::sample_std(&returns).or_else(|| input.change_24h.map(|c| c.abs() / 100.0))
}

/// Heavy turnover that does not move the price.
fn whale_accumulation(input: &SignalInput<'_>) -> f64 {
    let (Some(ratio), Some(impact)) = (input.volume_to_market_cap(), price_impact(input)) else {
        return Signal::WhaleAccumulation.neutral();
    };
    if ratio > 0.15 && impact < 0.05 {
        (ratio * 3.0).min(0.9)
    } else if ratio > 0.1 && impact < 0.08 {
        (ratio * 2.0).min(0.6)
    } else {
        0.3
    }
}

fn institutional_interest(input: &SignalInput<'_>) -> f64 {
    let (Some(rank), Some(volume)) = (input.rank, input.volume) else {
        return Signal::InstitutionalInterest.neutral();
    };
    if rank < 100 && volume > 10_000_000.0 {
        0.8
    } else if rank < 200 && volume > 5_000_000.0 {
        0.6
    } else if rank < 500 && volume > 1_000_000.0 {
        0.4
    } else {
        0.2
    }
}
