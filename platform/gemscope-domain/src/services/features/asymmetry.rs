use super::{SignalFamily, SignalInput};
use crate::entities::feature_vector::{FeatureVector, Signal};

/// Limited downside against large upside. `asymmetric_score` is the geometric
/// mean of the three components, so one weak leg drags the whole score down.
pub struct AsymmetryFamily;

const SIGNALS: &[Signal] = &[
    Signal::DownsideProtection,
    Signal::UpsideLeverage,
    Signal::Antifragility,
    Signal::AsymmetricScore,
];

impl SignalFamily for AsymmetryFamily {
    fn name(&self) -> &'static str {
        "asymmetry"
    }

    fn signals(&self) -> &'static [Signal] {
        SIGNALS
    }

    fn score(&self, input: &SignalInput<'_>, vector: &mut FeatureVector) {
        vector.set(Signal::DownsideProtection, downside_protection(input));
        vector.set(Signal::UpsideLeverage, upside_leverage(input));
        vector.set(Signal::Antifragility, antifragility(input));
        let product = vector.get(Signal::DownsideProtection)
            * vector.get(Signal::UpsideLeverage)
            * vector.get(Signal::Antifragility);
        vector.set(Signal::AsymmetricScore, product.cbrt());
    }
}

/// Assets that already fell far, with rank-based support, have less room to
/// fall further.
fn downside_protection(input: &SignalInput<'_>) -> f64 {
    let Some(rank) = input.rank else {
        return Signal::DownsideProtection.neutral();
    };
    let day_drop = input.change_24h.map(|c| (-c).max(0.0)).unwrap_or(0.0);
    let window_drop = input.drawdown_from_peak().unwrap_or(0.0) * 100.0;
    let drop = day_drop.max(window_drop);
    if drop > 20.0 {
        match rank {
            r if r < 100 => 0.8,
            r if r < 300 => 0.6,
            r if r < 500 => 0.4,
            _ => 0.2,
        }
    } else if drop > 10.0 {
        if rank < 300 {
            (f64::from(300 - rank) / 1000.0).max(0.3)
        } else {
            0.2
        }
    } else {
        0.1
    }
}

fn upside_leverage(input: &SignalInput<'_>) -> f64 {
    let (Some(rank), Some(volume)) = (input.rank, input.volume) else {
        return Signal::UpsideLeverage.neutral();
    };
    if 200 < rank && rank < 800 && volume > 100_000.0 {
        (f64::from(rank) / 1000.0 + volume / 10_000_000.0).min(0.8)
    } else if 100 < rank && rank <= 200 && volume > 1_000_000.0 {
        0.6
    } else {
        0.3
    }
}

/// Where the price sits between the window's trough and peak: assets that
/// bounced back from their low show resilience.
fn antifragility(input: &SignalInput<'_>) -> f64 {
    let path = input.price_path();
    if input.history.len() < input.config.min_history || input.price.is_none() {
        return Signal::Antifragility.neutral();
    }
    let low = path.iter().copied().fold(f64::INFINITY, f64::min);
    let high = path.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let Some(current) = path.last().copied() else {
        return Signal::Antifragility.neutral();
    };
    if high - low <= f64::EPSILON * high.abs().max(1.0) {
        return Signal::Antifragility.neutral();
    }
    (current - low) / (high - low)
}
