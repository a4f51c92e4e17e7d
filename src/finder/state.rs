//! Finder state and per-call statistics.

use std::time::{Duration, Instant};

/// Where the finder is in its attempt loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FinderState {
    /// Asking the planner for the next plan.
    #[default]
    TryingNextRoute,
    /// Driving a connect plan through its stages.
    StagingConnect,
    /// A stage produced a follow-up plan; it will be tried next.
    DeferredRetry,
    /// A connection was returned.
    Success,
    /// Every route failed.
    Exhausted,
    /// The call was canceled.
    Canceled,
}

impl FinderState {
    /// Check if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FinderState::Success | FinderState::Exhausted | FinderState::Canceled
        )
    }

    /// Check if an attempt is in progress.
    pub fn is_searching(&self) -> bool {
        matches!(
            self,
            FinderState::TryingNextRoute | FinderState::StagingConnect | FinderState::DeferredRetry
        )
    }
}

/// Statistics for one `find()` call.
#[derive(Debug, Clone, Default)]
pub struct FindStats {
    /// Number of times the planner was asked for a plan.
    pub plans_requested: u64,
    /// Number of pooled connections reused.
    pub reused: u64,
    /// Number of new connections established.
    pub connected: u64,
    /// Number of follow-up plans queued.
    pub deferred: u64,
    /// Number of failed attempts.
    pub failures: u64,
    /// When the call started.
    pub started: Option<Instant>,
    /// When the call reached a terminal state.
    pub finished: Option<Instant>,
}

impl FindStats {
    /// Record the start of a call.
    pub fn record_start(&mut self) {
        *self = Self {
            started: Some(Instant::now()),
            ..Self::default()
        };
    }

    /// Record a plan request.
    pub fn record_plan(&mut self) {
        self.plans_requested += 1;
    }

    /// Record a pooled connection being reused.
    pub fn record_reuse(&mut self) {
        self.reused += 1;
    }

    /// Record a new connection.
    pub fn record_connect(&mut self) {
        self.connected += 1;
    }

    /// Record a follow-up plan.
    pub fn record_deferred(&mut self) {
        self.deferred += 1;
    }

    /// Record a failed attempt.
    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    /// Record the end of a call.
    pub fn record_finish(&mut self) {
        self.finished = Some(Instant::now());
    }

    /// Get the call duration if it finished.
    pub fn elapsed(&self) -> Option<Duration> {
        match (self.started, self.finished) {
            (Some(start), Some(end)) => Some(end.duration_since(start)),
            _ => None,
        }
    }
}
