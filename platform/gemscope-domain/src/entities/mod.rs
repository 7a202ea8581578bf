pub mod availability;
pub mod feature_vector;
pub mod gem_score;
