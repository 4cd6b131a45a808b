//! Tick sources for continuous verification.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Reference interval between continuous attempts.
pub const DEFAULT_VERIFY_INTERVAL: Duration = Duration::from_millis(2000);

/// Produces attempt requests. Each completed `tick` asks for one attempt.
pub trait Scheduler: Send {
    fn tick(&mut self) -> impl Future<Output = ()> + Send + '_;
}

/// Fixed-period scheduler backed by [`tokio::time::Interval`].
///
/// The first tick fires one period after construction. Ticks missed while an
/// attempt was running are skipped, so no backlog builds up.
pub struct IntervalScheduler {
    interval: Interval,
}

impl IntervalScheduler {
    /// # Panics
    ///
    /// Panics if `period` is zero.
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }

    pub fn period(&self) -> Duration {
        self.interval.period()
    }
}

impl Scheduler for IntervalScheduler {
    async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_near(actual: Duration, expected: Duration) {
        let slack = Duration::from_millis(5);
        assert!(
            actual >= expected && actual <= expected + slack,
            "expected ~{expected:?}, got {actual:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_after_one_period() {
        let start = Instant::now();
        let mut s = IntervalScheduler::new(DEFAULT_VERIFY_INTERVAL);
        assert_eq!(s.period(), DEFAULT_VERIFY_INTERVAL);
        s.tick().await;
        assert_near(start.elapsed(), DEFAULT_VERIFY_INTERVAL);
        s.tick().await;
        assert_near(start.elapsed(), DEFAULT_VERIFY_INTERVAL * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missed_ticks_are_skipped() {
        let period = Duration::from_millis(100);
        let start = Instant::now();
        let mut s = IntervalScheduler::new(period);
        s.tick().await;

        // A slow attempt spanning several periods.
        tokio::time::sleep(Duration::from_millis(350)).await;
        s.tick().await; // overdue tick fires immediately
        assert_near(start.elapsed(), Duration::from_millis(450));

        // Realigns to the period grid instead of bursting the missed ticks.
        s.tick().await;
        assert_near(start.elapsed(), Duration::from_millis(500));
    }
}
