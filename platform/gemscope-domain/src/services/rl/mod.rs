//! Reinforcement-learning recommendation agent.
//!
//! A linear action-value function per action over [`RlState`], learned by
//! experience replay with a delayed target copy. Rewards come from
//! [`RewardModel`], which favours fast, low-drawdown gains.

mod agent;
mod experience;
mod q_function;
mod reward;
mod state;

pub use agent::{AgentStatus, ReplayScenario, RlAgent, RlConfig, RlTrainingMetrics};
pub use experience::{Experience, ExperienceStore, DEFAULT_EXPERIENCE_CAPACITY};
pub use q_function::LinearQ;
pub use reward::{RewardConfig, RewardModel};
pub use state::{RlState, STATE_LEN};
