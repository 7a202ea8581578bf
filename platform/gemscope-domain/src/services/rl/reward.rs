use crate::value_objects::action::ActionKind;
use crate::value_objects::trade_outcome::TradeOutcome;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RewardConfig {
    /// AVOID earns `-reward * avoid_factor`: dodging a loss is worth less
    /// than catching a gain.
    pub avoid_factor: f64,
    pub hold_reward: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            avoid_factor: 0.5,
            hold_reward: 0.0,
        }
    }
}

impl RewardConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.avoid_factor.is_finite() && self.avoid_factor >= 0.0) {
            return Err("reward.avoid_factor must be >= 0".to_string());
        }
        if !self.hold_reward.is_finite() {
            return Err("reward.hold_reward must be finite".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RewardModel {
    config: RewardConfig,
}

impl RewardModel {
    pub fn new(config: RewardConfig) -> Self {
        Self { config }
    }

    /// Annualized return discounted by drawdown:
    /// `(pl% * 365 / max(days, 1)) / (1 + |dd%| / 100)`.
    pub fn reward(&self, outcome: &TradeOutcome) -> f64 {
        let days = f64::from(outcome.days_held.max(1));
        let annualized = outcome.profit_loss_percent * 365.0 / days;
        let reward = annualized / (1.0 + outcome.max_drawdown_percent.abs() / 100.0);
        if reward.is_finite() {
            reward
        } else {
            0.0
        }
    }

    /// Reward credited to `action` had it been taken before `outcome`.
    pub fn shaped(&self, action: ActionKind, outcome: &TradeOutcome) -> f64 {
        match action {
            ActionKind::Buy => self.reward(outcome),
            ActionKind::Avoid => -self.reward(outcome) * self.config.avoid_factor,
            ActionKind::Hold => self.config.hold_reward,
        }
    }
}
