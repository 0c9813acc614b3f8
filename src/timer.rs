//! Deadline based timers
//!
//! Nothing here sleeps. The host asks for the next deadline, waits on
//! its own runtime and hands the current instant back in.

use std::time::{Duration, Instant};

/// Timer that fires once per enable
#[derive(Debug, Clone)]
pub struct OneShotTimer {
    timeout: Duration,
    deadline: Option<Instant>,
}

impl OneShotTimer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
        }
    }

    /// Arm the timer, restarting it if already armed
    pub fn enable(&mut self, now: Instant) {
        self.deadline = Some(now + self.timeout);
    }

    /// Disarm the timer. Disabling an idle timer is a no-op.
    pub fn disable(&mut self) {
        self.deadline = None;
    }

    pub fn is_enabled(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// True exactly once when the deadline has passed; the timer disarms
    /// itself.
    pub fn expired(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Fixed interval tick
#[derive(Debug, Clone)]
pub struct PeriodicTimer {
    interval: Duration,
    next: Instant,
}

impl PeriodicTimer {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            next: now + interval,
        }
    }

    /// True if a tick is due. Missed ticks are collapsed into one.
    pub fn poll(&mut self, now: Instant) -> bool {
        if now < self.next {
            return false;
        }
        self.next += self.interval;
        if self.next <= now {
            self.next = now + self.interval;
        }
        true
    }

    pub fn next_deadline(&self) -> Instant {
        self.next
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}
