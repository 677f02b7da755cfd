//! Cooperative scheduling helpers: a millisecond time base and periodic tasks.
use std::sync::Arc;
use std::time::{Duration, Instant};

use binsai_traits::Clock;

pub type SharedClock = Arc<dyn Clock + Send + Sync>;

/// Monotonic millisecond time base anchored at construction.
#[derive(Clone)]
pub struct Ticker {
    clock: SharedClock,
    epoch: Instant,
}

impl Ticker {
    pub fn new(clock: SharedClock) -> Self {
        let epoch = clock.now();
        Self { clock, epoch }
    }

    #[inline]
    pub fn now_ms(&self) -> u64 {
        self.clock.ms_since(self.epoch)
    }

    #[inline]
    pub fn sleep_ms(&self, ms: u64) {
        self.clock.sleep(Duration::from_millis(ms));
    }

    #[inline]
    pub fn sleep_short(&self, us: u32) {
        self.clock.sleep_short(us);
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }
}

/// True once `period_ms` has elapsed since `last_ms`.
#[inline]
pub fn deadline_reached(now_ms: u64, last_ms: u64, period_ms: u64) -> bool {
    now_ms.saturating_sub(last_ms) >= period_ms
}

/// A task that runs every `period_ms`; due immediately on first poll.
#[derive(Debug, Clone, Copy)]
pub struct Periodic {
    period_ms: u64,
    last_ms: Option<u64>,
}

impl Periodic {
    pub const fn new(period_ms: u64) -> Self {
        Self {
            period_ms,
            last_ms: None,
        }
    }

    /// Like `new`, but the first run waits a full period from `now_ms`.
    pub const fn starting_at(period_ms: u64, now_ms: u64) -> Self {
        Self {
            period_ms,
            last_ms: Some(now_ms),
        }
    }

    pub fn due(&self, now_ms: u64) -> bool {
        self.last_ms
            .is_none_or(|last| deadline_reached(now_ms, last, self.period_ms))
    }

    /// Returns true and records the run when due.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        if self.due(now_ms) {
            self.last_ms = Some(now_ms);
            true
        } else {
            false
        }
    }

    /// Record a run at `now_ms` made outside `poll`.
    pub fn mark(&mut self, now_ms: u64) {
        self.last_ms = Some(now_ms);
    }

    pub fn last_ms(&self) -> Option<u64> {
        self.last_ms
    }

    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }
}
