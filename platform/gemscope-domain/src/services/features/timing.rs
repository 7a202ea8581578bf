use super::{SignalFamily, SignalInput};
use crate::entities::feature_vector::{FeatureVector, Signal};

pub struct TimingFamily;

const SIGNALS: &[Signal] = &[
    Signal::VolumeSurge,
    Signal::QuietAccumulation,
    Signal::SurgeAge,
    Signal::Momentum,
];

impl SignalFamily for TimingFamily {
    fn name(&self) -> &'static str {
        "timing"
    }

    fn signals(&self) -> &'static [Signal] {
        SIGNALS
    }

    fn score(&self, input: &SignalInput<'_>, vector: &mut FeatureVector) {
        vector.set(Signal::VolumeSurge, volume_surge(input));
        vector.set(Signal::QuietAccumulation, quiet_accumulation(input));
        vector.set(Signal::SurgeAge, surge_age(input));
        vector.set(Signal::Momentum, momentum(input));
    }
}

/// Volume relative to what the rank tier usually trades, saturating at
/// `surge_saturation_multiple`.
fn volume_surge(input: &SignalInput<'_>) -> f64 {
    let (Some(volume), Some(expected)) = (input.volume, input.expected_volume()) else {
        return Signal::VolumeSurge.neutral();
    };
    (volume / (expected * input.config.surge_saturation_multiple)).min(1.0)
}

fn quiet_accumulation(input: &SignalInput<'_>) -> f64 {
    let (Some(ratio), Some(change)) = (input.volume_to_market_cap(), input.change_24h) else {
        return Signal::QuietAccumulation.neutral();
    };
    if ratio > 0.08 && change.abs() < 5.0 {
        (ratio * 5.0).min(0.8)
    } else {
        0.2
    }
}

/// How many of the most recent periods already traded at surge volume.
/// An old surge means a late entry.
fn surge_age(input: &SignalInput<'_>) -> f64 {
    let Some(expected) = input.expected_volume() else {
        return Signal::SurgeAge.neutral();
    };
    if input.history.is_empty() {
        return Signal::SurgeAge.neutral();
    }
    let threshold = expected * input.config.surge_age_min_multiple;
    let elevated = input
        .history
        .iter()
        .rev()
        .take_while(|point| point.volume.is_some_and(|v| v >= threshold))
        .count();
    (elevated as f64 / input.config.surge_age_horizon as f64).min(1.0)
}

fn momentum(input: &SignalInput<'_>) -> f64 {
    input
        .momentum_pct()
        .map(|pct| (pct / input.config.momentum_scale_pct).tanh())
        .unwrap_or(Signal::Momentum.neutral())
}
