//! Timing rules for the sync loop. Everything takes `now` explicitly so the
//! rules can be checked without sleeping.

use std::time::{Duration, Instant};

/// Suppresses timer polls for a while after a local mutation.
#[derive(Debug, Clone)]
pub struct QuietPeriod {
    duration: Duration,
    last_action: Option<Instant>,
}

impl QuietPeriod {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            last_action: None,
        }
    }

    pub fn mark(&mut self, now: Instant) {
        self.last_action = Some(now);
    }

    /// True once strictly more than the quiet period has passed since the
    /// last mutation, or if there never was one.
    pub fn allows_poll(&self, now: Instant) -> bool {
        match self.last_action {
            Some(at) => now.saturating_duration_since(at) > self.duration,
            None => true,
        }
    }
}

/// Fixed-interval poll timer.
#[derive(Debug, Clone)]
pub struct PollTimer {
    interval: Duration,
    last_fired: Instant,
}

impl PollTimer {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            last_fired: now,
        }
    }

    /// Fires at most once per interval; firing restarts the interval.
    pub fn fire(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_fired) >= self.interval {
            self.last_fired = now;
            true
        } else {
            false
        }
    }
}

/// One pending verification refetch. Scheduling again replaces the pending
/// deadline, so a burst of mutations verifies once, after the last.
#[derive(Debug, Clone, Default)]
pub struct VerifySchedule {
    due_at: Option<Instant>,
}

impl VerifySchedule {
    pub fn schedule(&mut self, now: Instant, delay: Duration) {
        self.due_at = Some(now + delay);
    }

    pub fn is_pending(&self) -> bool {
        self.due_at.is_some()
    }

    /// Consume the pending verification if its deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.due_at {
            Some(at) if now >= at => {
                self.due_at = None;
                true
            }
            _ => false,
        }
    }
}
