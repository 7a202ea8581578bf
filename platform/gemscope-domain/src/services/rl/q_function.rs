use super::state::{RlState, STATE_LEN};
use crate::value_objects::action::{ActionKind, ACTION_COUNT};
use serde::{Deserialize, Serialize};

/// `Q(s, a) = w_a · s + b_a`, one weight row per action with the bias last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearQ {
    weights: Vec<Vec<f64>>,
}

impl Default for LinearQ {
    fn default() -> Self {
        Self::zeros()
    }
}

impl LinearQ {
    pub fn zeros() -> Self {
        Self {
            weights: vec![vec![0.0; STATE_LEN + 1]; ACTION_COUNT],
        }
    }

    pub fn q(&self, state: &RlState, action: ActionKind) -> f64 {
        let row = &self.weights[action.index()];
        row[STATE_LEN]
            + row[..STATE_LEN]
                .iter()
                .zip(state.values())
                .map(|(w, x)| w * x)
                .sum::<f64>()
    }

    pub fn q_values(&self, state: &RlState) -> [f64; ACTION_COUNT] {
        ActionKind::ALL.map(|action| self.q(state, action))
    }

    pub fn max_q(&self, state: &RlState) -> f64 {
        self.q_values(state)
            .into_iter()
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Gradient step on one action row: `w += step * s`, `b += step`.
    pub fn update(&mut self, state: &RlState, action: ActionKind, step: f64) {
        let row = &mut self.weights[action.index()];
        for (w, x) in row[..STATE_LEN].iter_mut().zip(state.values()) {
            *w += step * x;
        }
        row[STATE_LEN] += step;
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.weights.len() != ACTION_COUNT
            || self.weights.iter().any(|row| row.len() != STATE_LEN + 1)
        {
            return Err(format!(
                "expected {ACTION_COUNT} rows of {} weights",
                STATE_LEN + 1
            ));
        }
        if self.weights.iter().flatten().any(|w| !w.is_finite()) {
            return Err("non-finite q weight".to_string());
        }
        Ok(())
    }
}
