use super::recommendation::StatusFlag;
use crate::config::GuardConfig;
use gemscope_domain::entities::feature_vector::{FeatureVector, Signal};
use gemscope_domain::value_objects::action::ActionKind;

/// Confidence and position after the failure-prevention pass.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardOutcome {
    pub confidence: f64,
    pub position_percent: f64,
    pub flags: Vec<StatusFlag>,
    pub risk_factors: Vec<String>,
}

/// Dampens confidence and position for known failure patterns. Each rule
/// that fires multiplies both by its factors and records a flag and a risk
/// factor. Rules compose.
pub fn apply(
    config: &GuardConfig,
    action: ActionKind,
    confidence: f64,
    position_percent: f64,
    novelty: f64,
    features: &FeatureVector,
) -> GuardOutcome {
    let mut outcome = GuardOutcome {
        confidence,
        position_percent,
        flags: Vec::new(),
        risk_factors: Vec::new(),
    };
    if !config.enabled {
        return outcome;
    }

    if confidence >= config.novelty_confidence_threshold && novelty >= config.novelty_threshold {
        outcome.confidence *= config.novelty_confidence_factor;
        outcome.position_percent *= config.novelty_position_factor;
        outcome.flags.push(StatusFlag::NoveltyDampened);
        outcome
            .risk_factors
            .push(format!("high confidence on an unfamiliar pattern (novelty {novelty:.2})"));
    }

    if action == ActionKind::Buy {
        let headwind = features.get(Signal::MacroHeadwind);
        if headwind > config.headwind_threshold {
            outcome.confidence *= config.headwind_confidence_factor;
            outcome.position_percent *= config.headwind_position_factor;
            outcome.flags.push(StatusFlag::HeadwindDampened);
            outcome
                .risk_factors
                .push(format!("buying against macro headwind ({headwind:.2})"));
        }

        let surge = features.get(Signal::VolumeSurge);
        let age = features.get(Signal::SurgeAge);
        if surge >= config.late_surge_threshold && age >= config.surge_age_threshold {
            outcome.confidence *= config.late_surge_confidence_factor;
            outcome.position_percent *= config.late_surge_position_factor;
            outcome.flags.push(StatusFlag::LateSurgeDampened);
            outcome
                .risk_factors
                .push(format!("late entry into an aging volume surge (age {age:.2})"));
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::apply;
    use crate::config::GuardConfig;
    use crate::live::recommendation::StatusFlag;
    use gemscope_domain::entities::feature_vector::{FeatureVector, Signal};
    use gemscope_domain::value_objects::action::ActionKind;

    #[test]
    fn quiet_inputs_pass_through() {
        let out = apply(
            &GuardConfig::default(),
            ActionKind::Buy,
            0.9,
            6.0,
            0.1,
            &FeatureVector::neutral(),
        );
        assert_eq!(out.confidence, 0.9);
        assert_eq!(out.position_percent, 6.0);
        assert!(out.flags.is_empty());
    }

    #[test]
    fn novelty_dampens_confident_calls() {
        let config = GuardConfig::default();
        let out = apply(&config, ActionKind::Hold, 0.9, 0.0, 0.8, &FeatureVector::neutral());
        assert_eq!(out.flags, vec![StatusFlag::NoveltyDampened]);
        assert!((out.confidence - 0.9 * config.novelty_confidence_factor).abs() < 1e-12);
    }

    #[test]
    fn buy_rules_compose() {
        let config = GuardConfig::default();
        let mut features = FeatureVector::neutral();
        features.set(Signal::MacroHeadwind, 0.9);
        features.set(Signal::VolumeSurge, 0.8);
        features.set(Signal::SurgeAge, 0.9);
        let out = apply(&config, ActionKind::Buy, 0.6, 10.0, 0.0, &features);
        assert_eq!(
            out.flags,
            vec![StatusFlag::HeadwindDampened, StatusFlag::LateSurgeDampened]
        );
        let expected =
            10.0 * config.headwind_position_factor * config.late_surge_position_factor;
        assert!((out.position_percent - expected).abs() < 1e-12);
        assert_eq!(out.risk_factors.len(), 2);
    }

    #[test]
    fn avoid_ignores_buy_rules_and_disabled_guard_is_inert() {
        let mut features = FeatureVector::neutral();
        features.set(Signal::MacroHeadwind, 0.9);
        let out = apply(&GuardConfig::default(), ActionKind::Avoid, 0.6, 0.0, 0.0, &features);
        assert!(out.flags.is_empty());

        let disabled = GuardConfig {
            enabled: false,
            ..GuardConfig::default()
        };
        let out = apply(&disabled, ActionKind::Buy, 0.95, 10.0, 0.99, &features);
        assert!(out.flags.is_empty());
        assert_eq!(out.confidence, 0.95);
    }
}
