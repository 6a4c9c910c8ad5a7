use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// A source of periodic ticks driving a watchdog's purges.
#[trait_variant::make(Timer: Send)]
pub trait LocalTimer {
    /// Waits for the next tick, `false` once the timer will never tick again.
    async fn tick(&mut self) -> bool;
}

/// Ticks every `period`, ticks missed while a purge was running are skipped.
#[derive(Debug)]
pub struct IntervalTimer {
    interval: Interval,
}

impl IntervalTimer {
    /// Must be called inside a tokio runtime.
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }
}

impl Timer for IntervalTimer {
    async fn tick(&mut self) -> bool {
        self.interval.tick().await;
        true
    }
}
