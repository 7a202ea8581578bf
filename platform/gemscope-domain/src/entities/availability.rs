use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedReason {
    /// The gem classifier has never been trained.
    ModelUntrained,
    /// The RL agent is not in the READY state.
    NotTrained,
    InvalidInput,
}

impl DegradedReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DegradedReason::ModelUntrained => "model_untrained",
            DegradedReason::NotTrained => "not_trained",
            DegradedReason::InvalidInput => "invalid_input",
        }
    }
}

/// Uniform result of every inference call: callers branch on the variant
/// instead of catching errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability<T> {
    Ready(T),
    Degraded(T, DegradedReason),
    Unavailable(DegradedReason),
}

impl<T> Availability<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Availability::Ready(value) | Availability::Degraded(value, _) => Some(value),
            Availability::Unavailable(_) => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Availability::Ready(value) | Availability::Degraded(value, _) => Some(value),
            Availability::Unavailable(_) => None,
        }
    }

    pub fn reason(&self) -> Option<DegradedReason> {
        match self {
            Availability::Ready(_) => None,
            Availability::Degraded(_, reason) | Availability::Unavailable(reason) => Some(*reason),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Availability::Ready(_))
    }

    pub fn status_label(&self) -> &'static str {
        match self {
            Availability::Ready(_) => "ready",
            Availability::Degraded(..) => "degraded",
            Availability::Unavailable(_) => "unavailable",
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Availability<U> {
        match self {
            Availability::Ready(value) => Availability::Ready(f(value)),
            Availability::Degraded(value, reason) => Availability::Degraded(f(value), reason),
            Availability::Unavailable(reason) => Availability::Unavailable(reason),
        }
    }
}
