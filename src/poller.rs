// ===============================
// src/poller.rs
// ===============================
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Fixed-period refresh timer. Idle until `start()`, which is called on the
/// first non-empty commit; later commits do not reset its cadence.
#[derive(Debug)]
pub struct PollScheduler {
    period: Duration,
    timer: Option<Interval>,
}

impl PollScheduler {
    pub fn new(period: Duration) -> Self { Self { period, timer: None } }

    pub fn is_running(&self) -> bool { self.timer.is_some() }

    /// First tick lands one full period after `now`. No-op if already running.
    pub fn start(&mut self, now: Instant) {
        if self.timer.is_some() {
            return;
        }
        let mut t = interval_at(now + self.period, self.period);
        t.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.timer = Some(t);
    }

    pub fn stop(&mut self) { self.timer = None; }

    /// Resolves on the next tick; pends forever while stopped.
    pub async fn tick(&mut self) -> Instant {
        match self.timer.as_mut() {
            Some(t) => t.tick().await,
            None => std::future::pending().await,
        }
    }
}
