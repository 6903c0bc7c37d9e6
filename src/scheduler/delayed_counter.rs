use tokio::time::{Duration, Instant};

/// Counter that stays at zero for a grace period after a reset, then counts up once per tick.
///
/// Added to every price while the node has orders, so a node that stops delivering slowly
/// prices itself out of new auctions.
pub struct DelayedCounter {
    delay: Duration,
    tick: Duration,
    start_time: Instant,
}

pub fn new(delay: Duration, tick: Duration) -> DelayedCounter {
    DelayedCounter {
        delay,
        tick,
        start_time: Instant::now(),
    }
}

impl DelayedCounter {
    pub fn reset(&mut self) {
        self.start_time = Instant::now();
    }

    /// Number of whole ticks since the grace period ended.
    pub fn count(&self) -> i64 {
        let elapsed = Instant::now() - self.start_time;
        match elapsed.checked_sub(self.delay) {
            Some(over) if !self.tick.is_zero() => (over.as_nanos() / self.tick.as_nanos()) as i64,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zero_during_grace_period() {
        let counter = new(Duration::from_millis(50), Duration::from_millis(5));
        assert_eq!(counter.count(), 0);
    }

    #[tokio::test]
    async fn counts_after_delay_and_resets() {
        let mut counter = new(Duration::from_millis(20), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(55)).await;
        assert!(counter.count() >= 3);

        counter.reset();
        assert_eq!(counter.count(), 0);
    }
}
