use thiserror::Error;

/// Malformed or missing input values. Extraction recovers from these with
/// neutral defaults; only explicit write paths (trade outcomes) surface them.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid input data: {0}")]
pub struct InputDataError(pub String);

/// A training request refused synchronously. Whatever model was active
/// before the request stays active.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrainingRejected {
    #[error("insufficient_data: {0}")]
    InsufficientData(String),
    #[error("already_training")]
    AlreadyTraining,
    #[error("cancelled")]
    Cancelled,
    #[error("persistence: {0}")]
    Persistence(String),
}

impl TrainingRejected {
    pub fn code(&self) -> &'static str {
        match self {
            TrainingRejected::InsufficientData(_) => "insufficient_data",
            TrainingRejected::AlreadyTraining => "already_training",
            TrainingRejected::Cancelled => "cancelled",
            TrainingRejected::Persistence(_) => "persistence",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("model blob `{name}` failed validation: {reason}")]
pub struct ModelCorruption {
    pub name: String,
    pub reason: String,
}

impl ModelCorruption {
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
