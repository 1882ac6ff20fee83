//! Dual-timer completion policy for interactive turns
//!
//! The hard deadline is fixed when the turn starts. The idle deadline is
//! armed by the first chunk and pushed forward by every later chunk.

use std::time::Duration;

use tokio::time::Instant;

/// Why a turn ended on a timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Output went quiet for the idle window
    Idle,
    /// The hard ceiling passed
    HardTimeout,
}

/// Tracks the idle and hard deadlines of one turn
#[derive(Debug, Clone)]
pub struct CompletionDetector {
    hard_deadline: Instant,
    idle: Duration,
    idle_deadline: Option<Instant>,
}

impl CompletionDetector {
    /// Start the hard timer now
    #[must_use]
    pub fn start(timeout: Duration, idle: Duration) -> Self {
        Self {
            hard_deadline: Instant::now() + timeout,
            idle,
            idle_deadline: None,
        }
    }

    /// Record an inbound chunk
    pub fn on_chunk(&mut self) {
        self.idle_deadline = Some(Instant::now() + self.idle);
    }

    /// Earliest instant at which [`check`](Self::check) can report completion
    #[must_use]
    pub fn next_deadline(&self) -> Instant {
        match self.idle_deadline {
            Some(idle) if idle < self.hard_deadline => idle,
            _ => self.hard_deadline,
        }
    }

    /// Completion state at `now`
    #[must_use]
    pub fn check(&self, now: Instant) -> Option<Completion> {
        if now >= self.hard_deadline {
            return Some(Completion::HardTimeout);
        }
        match self.idle_deadline {
            Some(idle) if now >= idle => Some(Completion::Idle),
            _ => None,
        }
    }
}
