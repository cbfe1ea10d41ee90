//! Run-level cancellation.
//!
//! A token is cancelled when its deadline passes or someone calls
//! [`CancelToken::cancel`] (the CLI does so on Ctrl+C). The scheduler checks
//! it before dispatching each resource; work already in flight finishes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Shared cancellation flag with an optional deadline.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    interrupted: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// A token that is only cancelled explicitly.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that also cancels once `timeout` has elapsed from now.
    ///
    /// A timeout too large to represent as an instant means no deadline.
    #[must_use]
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self {
            interrupted: Arc::new(AtomicBool::new(false)),
            deadline: timeout.and_then(|t| Instant::now().checked_add(t)),
        }
    }

    /// Cancels the run.
    pub fn cancel(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    /// Why the run is cancelled, or `None` if it is not.
    #[must_use]
    pub fn reason(&self) -> Option<&'static str> {
        if self.interrupted.load(Ordering::SeqCst) {
            Some("interrupted")
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some("run timeout exceeded")
        } else {
            None
        }
    }
}
