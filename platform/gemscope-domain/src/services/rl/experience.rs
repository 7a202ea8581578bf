//! Bounded FIFO store of replay experiences.

use super::state::RlState;
use crate::value_objects::action::ActionKind;
use std::collections::VecDeque;

pub const DEFAULT_EXPERIENCE_CAPACITY: usize = 10_000;

/// One learning sample (s, a, r, s').
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Experience {
    pub state: RlState,
    pub action: ActionKind,
    /// Raw reward from the reward model (not yet normalized).
    pub reward: f64,
    /// `None` for terminal samples.
    pub next_state: Option<RlState>,
}

/// Ring buffer that evicts the oldest experience once `capacity` is reached.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperienceStore {
    buffer: VecDeque<Experience>,
    capacity: usize,
}

impl Default for ExperienceStore {
    fn default() -> Self {
        Self::new(DEFAULT_EXPERIENCE_CAPACITY)
    }
}

impl ExperienceStore {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: VecDeque::with_capacity(capacity.min(1_024)),
            capacity,
        }
    }

    pub fn push(&mut self, experience: Experience) {
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(experience);
    }

    pub fn extend<I: IntoIterator<Item = Experience>>(&mut self, experiences: I) {
        for experience in experiences {
            self.push(experience);
        }
    }

    /// Shrinking drops the oldest experiences.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.buffer.len() > self.capacity {
            self.buffer.pop_front();
        }
    }

    pub fn get(&self, index: usize) -> Option<&Experience> {
        self.buffer.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Experience> {
        self.buffer.iter()
    }

    pub fn to_vec(&self) -> Vec<Experience> {
        self.buffer.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
