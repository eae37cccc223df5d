//! Sliding-window limiter guarding calls to the hosted model.
//!
//! The window is a queue of admission instants. Prune, count and record
//! happen under one lock, so at most `max_calls` admissions fall inside
//! any trailing `period`. Waiting happens outside the lock.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::clock::Clock;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LimiterError {
    #[error("rate limit needs max_calls > 0 and a non-zero period")]
    InvalidQuota,
}

/// Blocking call-rate limiter shared by every request thread.
pub struct RateLimiter {
    window: Mutex<VecDeque<Instant>>,
    max_calls: usize,
    period: Duration,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(
        max_calls: usize,
        period: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LimiterError> {
        if max_calls == 0 || period.is_zero() {
            return Err(LimiterError::InvalidQuota);
        }
        Ok(Self {
            window: Mutex::new(VecDeque::with_capacity(max_calls)),
            max_calls,
            period,
            clock,
        })
    }

    pub fn max_calls(&self) -> usize {
        self.max_calls
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Block until a slot is free, then record the call.
    pub fn acquire(&self) {
        loop {
            let wait = match self.try_admit() {
                None => return,
                Some(wait) => wait,
            };
            tracing::debug!(
                wait_ms = wait.as_millis() as u64,
                max_calls = self.max_calls,
                "Model rate limit reached, waiting for a slot"
            );
            self.clock.sleep(wait);
        }
    }

    /// Admit now and return `None`, or return how long until the oldest
    /// retained call leaves the window.
    fn try_admit(&self) -> Option<Duration> {
        // Poisoning leaves the queue intact.
        let mut window = self.window.lock().unwrap_or_else(|p| p.into_inner());
        let now = self.clock.now();

        while let Some(oldest) = window.front() {
            if now.duration_since(*oldest) >= self.period {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() < self.max_calls {
            window.push_back(now);
            return None;
        }

        let oldest = *window.front()?;
        let wait = self.period.saturating_sub(now.duration_since(oldest));
        Some(wait.max(Duration::from_millis(1)))
    }

    /// Calls recorded inside the current window.
    pub fn in_flight(&self) -> usize {
        let now = self.clock.now();
        let window = self.window.lock().unwrap_or_else(|p| p.into_inner());
        window
            .iter()
            .filter(|ts| now.duration_since(**ts) < self.period)
            .count()
    }
}
