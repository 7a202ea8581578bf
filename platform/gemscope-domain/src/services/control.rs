use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation, polled by training loops between batches.
pub trait TrainingControl: Send + Sync {
    fn should_cancel(&self) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopControl;

impl TrainingControl for NoopControl {
    fn should_cancel(&self) -> bool {
        false
    }
}

#[derive(Debug, Default, Clone)]
pub struct CancellationToken {
    cancel: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}

impl TrainingControl for CancellationToken {
    fn should_cancel(&self) -> bool {
        self.is_cancelled()
    }
}
