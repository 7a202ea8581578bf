use super::{SignalFamily, SignalInput};
use crate::entities::feature_vector::{FeatureVector, Signal};

/// Crowd-behaviour signals: panic selling, neglect, herd reversal.
pub struct PsychologyFamily;

const SIGNALS: &[Signal] = &[
    Signal::FearOpportunity,
    Signal::NeglectOpportunity,
    Signal::AntiHerdMomentum,
    Signal::RetailExhaustion,
];

impl SignalFamily for PsychologyFamily {
    fn name(&self) -> &'static str {
        "psychology"
    }

    fn signals(&self) -> &'static [Signal] {
        SIGNALS
    }

    fn score(&self, input: &SignalInput<'_>, vector: &mut FeatureVector) {
        vector.set(Signal::FearOpportunity, fear_opportunity(input));
        vector.set(Signal::NeglectOpportunity, neglect_opportunity(input));
        vector.set(Signal::AntiHerdMomentum, anti_herd_momentum(input));
        vector.set(Signal::RetailExhaustion, retail_exhaustion(input));
    }
}

/// Sharp 24h drop on a well-ranked asset, scaled by rank quality.
fn fear_opportunity(input: &SignalInput<'_>) -> f64 {
    let config = input.config;
    let (Some(rank), Some(change)) = (input.rank, input.change_24h) else {
        return Signal::FearOpportunity.neutral();
    };
    if rank > config.fear_max_rank || change >= -config.fear_drop_threshold_pct {
        return 0.0;
    }
    let intensity = (change.abs() / config.fear_full_drop_pct).min(1.0);
    let quality = 1.0 - f64::from(rank - 1) / f64::from(config.fear_max_rank);
    intensity * (0.5 + 0.5 * quality)
}

fn neglect_opportunity(input: &SignalInput<'_>) -> f64 {
    let (Some(rank), Some(volume), Some(expected)) =
        (input.rank, input.volume, input.expected_volume())
    else {
        return Signal::NeglectOpportunity.neutral();
    };
    if !(100 < rank && rank < 800) || volume >= expected * 0.3 {
        return 0.0;
    }
    if volume <= 0.0 {
        return 0.8;
    }
    ((expected / volume) / 10.0).min(0.8)
}

/// Small caps rising or large caps falling: moves against the usual herd.
fn anti_herd_momentum(input: &SignalInput<'_>) -> f64 {
    let (Some(rank), Some(change)) = (input.rank, input.change_24h) else {
        return Signal::AntiHerdMomentum.neutral();
    };
    if change > 5.0 && rank > 300 {
        (change / 20.0).min(0.8)
    } else if change < -5.0 && rank < 100 {
        (change.abs() / 30.0).min(0.6)
    } else {
        0.2
    }
}

fn retail_exhaustion(input: &SignalInput<'_>) -> f64 {
    let Some(change) = input.change_24h else {
        return Signal::RetailExhaustion.neutral();
    };
    if change >= -10.0 {
        return 0.2;
    }
    let base = (change.abs() / 30.0).min(0.8);
    let tier = match input.rank {
        Some(rank) if rank < 200 => 1.2,
        Some(rank) if rank < 500 => 1.0,
        _ => 0.7,
    };
    (base * tier).min(1.0)
}
