use std::sync::Arc;
use std::time::Duration;

use crate::foundation::clock::Clock;

/// Snapshot returned by [`TimeEstimator::estimate`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeEstimate {
    /// Completion in `[0, 1]`.
    pub completion: f64,
    /// Time since the last [`TimeEstimator::reset`].
    pub elapsed: Duration,
    /// Remaining time, `None` while no progress has been made.
    pub eta: Option<Duration>,
}

/// Linear time-to-completion extrapolation.
pub struct TimeEstimator {
    clock: Arc<dyn Clock>,
    started_at: Duration,
    completion: f64,
    next_completion: f64,
    updated: bool,
}

impl std::fmt::Debug for TimeEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeEstimator")
            .field("started_at", &self.started_at)
            .field("completion", &self.completion)
            .field("next_completion", &self.next_completion)
            .finish_non_exhaustive()
    }
}

impl TimeEstimator {
    /// Create an estimator started at the clock's current time.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let started_at = clock.now();
        Self {
            clock,
            started_at,
            completion: 0.0,
            next_completion: 0.0,
            updated: false,
        }
    }

    /// Restart timing. `next_completion` is the completion expected after the first unit of work
    /// and seeds the estimate until the first [`TimeEstimator::update`].
    pub fn reset(&mut self, next_completion: f64) {
        self.started_at = self.clock.now();
        self.completion = 0.0;
        self.next_completion = next_completion.clamp(0.0, 1.0);
        self.updated = false;
    }

    /// Record the current completion.
    pub fn update(&mut self, completion: f64) {
        self.completion = completion.clamp(0.0, 1.0);
        self.updated = true;
    }

    /// Current completion.
    pub fn completion(&self) -> f64 {
        self.completion
    }

    /// Extrapolate the remaining time from the elapsed time.
    pub fn estimate(&self) -> TimeEstimate {
        let elapsed = self.clock.now().saturating_sub(self.started_at);
        let c = if self.updated {
            self.completion
        } else {
            self.next_completion
        };
        let eta = if c >= 1.0 {
            Some(Duration::ZERO)
        } else if c <= 0.0 {
            None
        } else {
            Some(elapsed.mul_f64((1.0 - c) / c))
        };
        TimeEstimate {
            completion: self.completion,
            elapsed,
            eta,
        }
    }
}
