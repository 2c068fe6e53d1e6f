// SPDX-License-Identifier: CEPL-1.0
use std::time::{Duration, Instant};

/// Fixed-rate scheduler. Missed deadlines are skipped rather than replayed, so a
/// long frame never causes a burst of catch-up ticks.
#[derive(Debug)]
pub struct Ticker {
    period: Duration,
    next: Option<Instant>,
}

impl Ticker {
    pub fn from_hz(hz: u32) -> Self {
        Self::new(Duration::from_nanos(1_000_000_000u64 / hz.max(1) as u64))
    }

    /// Periods below 1ns are raised to 1ns.
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_nanos(1)),
            next: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Sleeps until the next deadline (the first call returns immediately).
    pub fn wait(&mut self) {
        let now = Instant::now();
        let deadline = self.next.unwrap_or(now);
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
        self.next = Some(self.advance(deadline, Instant::now()));
    }

    fn advance(&self, deadline: Instant, now: Instant) -> Instant {
        let mut next = deadline + self.period;
        if next <= now {
            let behind = now.duration_since(next).as_nanos() / self.period.as_nanos().max(1);
            next += self.period * u32::try_from(behind).unwrap_or(u32::MAX).saturating_add(1);
        }
        next
    }
}
