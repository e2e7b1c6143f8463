//! ---
//! rcc_section: "01-core-functionality"
//! rcc_subsection: "module"
//! rcc_type: "source"
//! rcc_scope: "code"
//! rcc_description: "Fixed-period tick sources for the control loop."
//! rcc_version: "v0.1.0"
//! rcc_owner: "tbd"
//! ---
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};

/// Interval that never bursts to catch up after a slow iteration.
#[derive(Debug)]
pub struct RateLimiter {
    period: Duration,
    interval: tokio::time::Interval,
}

impl RateLimiter {
    /// The first tick fires one full `period` after construction.
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { period, interval }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub async fn tick(&mut self) -> Instant {
        self.interval.tick().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_tick_waits_one_period() {
        let start = Instant::now();
        let mut limiter = RateLimiter::new(Duration::from_millis(250));
        limiter.tick().await;
        assert!(start.elapsed() >= Duration::from_millis(250));
        limiter.tick().await;
        assert!(start.elapsed() >= Duration::from_millis(500));
    }
}
