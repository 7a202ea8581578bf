//! The recommendation agent and its training loop.
//!
//! Lifecycle: `UNINITIALIZED -> TRAINING -> READY -> TRAINING -> READY ...`.
//! Only a READY agent produces non-default recommendations.

use super::experience::{Experience, ExperienceStore, DEFAULT_EXPERIENCE_CAPACITY};
use super::q_function::LinearQ;
use super::reward::RewardModel;
use super::state::RlState;
use crate::entities::availability::{Availability, DegradedReason};
use crate::errors::TrainingRejected;
use crate::services::control::TrainingControl;
use crate::value_objects::action::{ActionKind, RlAction, ACTION_COUNT};
use crate::value_objects::trade_outcome::TradeOutcome;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStatus {
    Uninitialized,
    Training,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RlConfig {
    pub learning_rate: f64,
    pub discount: f64,
    pub epsilon_start: f64,
    pub epsilon_end: f64,
    pub epochs: usize,
    pub batch_size: usize,
    pub max_batches_per_epoch: usize,
    /// Online updates between hard syncs of the target function.
    pub target_sync_interval: u64,
    pub min_experiences: usize,
    /// Softmax temperature used to turn Q-values into a confidence.
    pub temperature: f64,
    /// Rewards are squashed with `tanh(reward / reward_scale)` before learning.
    pub reward_scale: f64,
    pub td_error_clip: f64,
    pub max_position_percent: f64,
    pub buffer_capacity: usize,
    pub seed: u64,
}

impl Default for RlConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.05,
            discount: 0.9,
            epsilon_start: 1.0,
            epsilon_end: 0.05,
            epochs: 40,
            batch_size: 32,
            max_batches_per_epoch: 64,
            target_sync_interval: 50,
            min_experiences: 32,
            temperature: 0.25,
            reward_scale: 100.0,
            td_error_clip: 1.0,
            max_position_percent: 10.0,
            buffer_capacity: DEFAULT_EXPERIENCE_CAPACITY,
            seed: 7,
        }
    }
}

impl RlConfig {
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("learning_rate", self.learning_rate),
            ("epsilon_end", self.epsilon_end),
            ("temperature", self.temperature),
            ("reward_scale", self.reward_scale),
            ("td_error_clip", self.td_error_clip),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(format!("rl.{name} must be > 0"));
            }
        }
        if !(0.0..1.0).contains(&self.discount) {
            return Err("rl.discount must be within [0, 1)".to_string());
        }
        if !(self.epsilon_start <= 1.0 && self.epsilon_start >= self.epsilon_end) {
            return Err("rl.epsilon_start must be within [epsilon_end, 1]".to_string());
        }
        if self.epochs == 0 || self.batch_size == 0 || self.max_batches_per_epoch == 0 {
            return Err("rl.epochs, rl.batch_size and rl.max_batches_per_epoch must be > 0".to_string());
        }
        if self.target_sync_interval == 0 {
            return Err("rl.target_sync_interval must be > 0".to_string());
        }
        if self.buffer_capacity == 0 {
            return Err("rl.buffer_capacity must be > 0".to_string());
        }
        if !(0.0..=100.0).contains(&self.max_position_percent) {
            return Err("rl.max_position_percent must be within [0, 100]".to_string());
        }
        Ok(())
    }

    /// Geometric decay from `epsilon_start` to `epsilon_end` across epochs.
    pub fn epsilon_for_epoch(&self, epoch: usize) -> f64 {
        if self.epochs <= 1 {
            return self.epsilon_start;
        }
        let progress = epoch.min(self.epochs - 1) as f64 / (self.epochs - 1) as f64;
        self.epsilon_start * (self.epsilon_end / self.epsilon_start).powf(progress)
    }
}

/// One historical decision point: the state at entry and what holding would
/// have produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayScenario {
    pub state: RlState,
    pub outcome: TradeOutcome,
    pub next_state: Option<RlState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RlTrainingMetrics {
    pub epochs: usize,
    pub updates: u64,
    pub final_epsilon: f64,
    /// Mean absolute (clipped) TD error over the last epoch.
    pub mean_abs_td_error: f64,
    pub mean_shaped_reward: f64,
    pub experiences: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredAgent")]
pub struct RlAgent {
    status: AgentStatus,
    online: LinearQ,
    target: LinearQ,
    config: RlConfig,
    train_steps: u64,
    epsilon: f64,
    #[serde(skip)]
    experiences: ExperienceStore,
}

/// Persisted form; replay memory is never stored.
#[derive(Deserialize)]
struct StoredAgent {
    status: AgentStatus,
    online: LinearQ,
    target: LinearQ,
    config: RlConfig,
    train_steps: u64,
    epsilon: f64,
}

impl From<StoredAgent> for RlAgent {
    fn from(stored: StoredAgent) -> Self {
        Self {
            experiences: ExperienceStore::new(stored.config.buffer_capacity),
            status: stored.status,
            online: stored.online,
            target: stored.target,
            config: stored.config,
            train_steps: stored.train_steps,
            epsilon: stored.epsilon,
        }
    }
}

impl RlAgent {
    pub fn new(config: RlConfig) -> Self {
        let experiences = ExperienceStore::new(config.buffer_capacity);
        Self {
            status: AgentStatus::Uninitialized,
            online: LinearQ::zeros(),
            target: LinearQ::zeros(),
            epsilon: config.epsilon_start,
            config,
            train_steps: 0,
            experiences,
        }
    }

    pub fn status(&self) -> AgentStatus {
        self.status
    }

    pub fn is_ready(&self) -> bool {
        self.status == AgentStatus::Ready
    }

    pub fn config(&self) -> &RlConfig {
        &self.config
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn train_steps(&self) -> u64 {
        self.train_steps
    }

    pub fn experiences(&self) -> &ExperienceStore {
        &self.experiences
    }

    /// Applies a new configuration, keeping learned parameters. The replay
    /// store is resized to the new capacity.
    pub fn reconfigure(&mut self, config: RlConfig) {
        self.experiences.set_capacity(config.buffer_capacity);
        self.config = config;
    }

    pub fn absorb<I: IntoIterator<Item = Experience>>(&mut self, experiences: I) {
        self.experiences.extend(experiences);
    }

    /// Drops replay memory, e.g. before publishing the agent in a snapshot.
    pub fn without_experiences(mut self) -> Self {
        self.experiences = ExperienceStore::new(self.config.buffer_capacity);
        self
    }

    pub fn q_values(&self, state: &RlState) -> [f64; ACTION_COUNT] {
        self.online.q_values(state)
    }

    /// Greedy action. Not READY: HOLD with zero confidence, flagged
    /// `not_trained`.
    pub fn predict(&self, state: &RlState) -> Availability<RlAction> {
        if !self.is_ready() {
            return Availability::Degraded(RlAction::hold(), DegradedReason::NotTrained);
        }
        let q = self.online.q_values(state);
        let kind = greedy(&q);
        let confidence = softmax_probability(&q, kind, self.config.temperature);
        let position = if kind == ActionKind::Buy {
            self.config.max_position_percent * confidence
        } else {
            0.0
        };
        Availability::Ready(RlAction::new(kind, position, confidence))
    }

    /// Checks parameters restored from storage.
    pub fn validate(&self) -> Result<(), String> {
        self.online.validate()?;
        self.target.validate()?;
        self.config.validate()?;
        if self.status == AgentStatus::Training {
            return Err("persisted agent cannot be mid-training".to_string());
        }
        Ok(())
    }

    /// Replays `scenarios` for `config.epochs` epochs, choosing actions
    /// epsilon-greedily and learning from minibatches of the replay store.
    ///
    /// Rejected with `insufficient_data` before any state changes when the
    /// store plus scenarios hold fewer than `min_experiences` samples. On
    /// cancellation the agent is restored to its pre-training parameters.
    pub fn train(
        &mut self,
        scenarios: &[ReplayScenario],
        reward_model: &RewardModel,
        control: &dyn TrainingControl,
    ) -> Result<RlTrainingMetrics, TrainingRejected> {
        let available = self.experiences.len() + scenarios.len();
        let required = self.config.min_experiences.max(1);
        if available < required {
            return Err(TrainingRejected::InsufficientData(format!(
                "{available} experiences available, need at least {required}"
            )));
        }

        let backup = self.clone();
        self.status = AgentStatus::Training;
        match self.run_epochs(scenarios, reward_model, control) {
            Ok(metrics) => {
                self.target = self.online.clone();
                self.status = AgentStatus::Ready;
                Ok(metrics)
            }
            Err(err) => {
                *self = backup;
                Err(err)
            }
        }
    }

    fn run_epochs(
        &mut self,
        scenarios: &[ReplayScenario],
        reward_model: &RewardModel,
        control: &dyn TrainingControl,
    ) -> Result<RlTrainingMetrics, TrainingRejected> {
        let mut rng = StdRng::seed_from_u64(
            self.config.seed ^ self.train_steps.wrapping_mul(0x9E37_79B9_7F4A_7C15),
        );
        let mut updates = 0u64;
        let mut last_epoch_td = 0.0;
        let mut reward_sum = 0.0;
        let mut reward_count = 0usize;

        for epoch in 0..self.config.epochs {
            if control.should_cancel() {
                return Err(TrainingRejected::Cancelled);
            }
            self.epsilon = self.config.epsilon_for_epoch(epoch);

            for scenario in scenarios {
                let action = if rng.gen::<f64>() < self.epsilon {
                    ActionKind::ALL[rng.gen_range(0..ACTION_COUNT)]
                } else {
                    greedy(&self.online.q_values(&scenario.state))
                };
                let reward = reward_model.shaped(action, &scenario.outcome);
                reward_sum += reward;
                reward_count += 1;
                self.experiences.push(Experience {
                    state: scenario.state,
                    action,
                    reward,
                    next_state: scenario.next_state,
                });
            }

            let len = self.experiences.len();
            let batch = self.config.batch_size.min(len);
            let batches = len
                .div_ceil(self.config.batch_size)
                .clamp(1, self.config.max_batches_per_epoch);
            let mut td_sum = 0.0;
            let mut td_count = 0usize;
            for _ in 0..batches {
                if control.should_cancel() {
                    return Err(TrainingRejected::Cancelled);
                }
                for idx in rand::seq::index::sample(&mut rng, len, batch).iter() {
                    let Some(experience) = self.experiences.get(idx).copied() else {
                        continue;
                    };
                    td_sum += self.learn(&experience);
                    td_count += 1;
                    updates += 1;
                }
            }
            last_epoch_td = if td_count > 0 {
                td_sum / td_count as f64
            } else {
                0.0
            };
        }

        Ok(RlTrainingMetrics {
            epochs: self.config.epochs,
            updates,
            final_epsilon: self.epsilon,
            mean_abs_td_error: last_epoch_td,
            mean_shaped_reward: if reward_count > 0 {
                reward_sum / reward_count as f64
            } else {
                0.0
            },
            experiences: self.experiences.len(),
        })
    }

    /// One TD(0) step against the target function; returns |clipped TD error|.
    fn learn(&mut self, experience: &Experience) -> f64 {
        let reward = (experience.reward / self.config.reward_scale).tanh();
        let target = match &experience.next_state {
            Some(next) => reward + self.config.discount * self.target.max_q(next),
            None => reward,
        };
        let current = self.online.q(&experience.state, experience.action);
        let td = (target - current).clamp(-self.config.td_error_clip, self.config.td_error_clip);
        self.online.update(
            &experience.state,
            experience.action,
            self.config.learning_rate * td,
        );
        self.train_steps += 1;
        if self.train_steps % self.config.target_sync_interval == 0 {
            self.target = self.online.clone();
        }
        td.abs()
    }
}

/// Highest Q-value; ties resolve to HOLD, then BUY before AVOID.
fn greedy(q: &[f64; ACTION_COUNT]) -> ActionKind {
    let mut best = ActionKind::Hold;
    for kind in [ActionKind::Buy, ActionKind::Avoid] {
        if q[kind.index()] > q[best.index()] + 1e-12 {
            best = kind;
        }
    }
    best
}

fn softmax_probability(q: &[f64; ACTION_COUNT], kind: ActionKind, temperature: f64) -> f64 {
    let max = q.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = q.iter().map(|v| ((v - max) / temperature).exp()).collect();
    let total: f64 = exps.iter().sum();
    if total > 0.0 && total.is_finite() {
        exps[kind.index()] / total
    } else {
        0.0
    }
}
