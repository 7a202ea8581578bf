pub mod classifier;
pub mod control;
pub mod features;
pub mod rl;
