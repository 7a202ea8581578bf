use serde::{Deserialize, Serialize};

pub const ACTION_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionKind {
    Buy,
    Hold,
    Avoid,
}

impl ActionKind {
    pub const ALL: [ActionKind; ACTION_COUNT] = [ActionKind::Buy, ActionKind::Hold, ActionKind::Avoid];

    pub fn index(self) -> usize {
        match self {
            ActionKind::Buy => 0,
            ActionKind::Hold => 1,
            ActionKind::Avoid => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Buy => "BUY",
            ActionKind::Hold => "HOLD",
            ActionKind::Avoid => "AVOID",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RlAction {
    pub kind: ActionKind,
    /// Share of the portfolio in percent, within `[0, 100]`.
    pub position_size_percent: f64,
    pub confidence: f64,
}

impl RlAction {
    pub fn hold() -> Self {
        Self {
            kind: ActionKind::Hold,
            position_size_percent: 0.0,
            confidence: 0.0,
        }
    }

    pub fn new(kind: ActionKind, position_size_percent: f64, confidence: f64) -> Self {
        let position_size_percent = if kind == ActionKind::Buy && position_size_percent.is_finite() {
            position_size_percent.clamp(0.0, 100.0)
        } else {
            0.0
        };
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            kind,
            position_size_percent,
            confidence,
        }
    }
}
