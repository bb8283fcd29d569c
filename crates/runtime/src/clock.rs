use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::stop::StopSignal;

/// Slice length for interruptible sleeps.  Bounds stop-signal latency well
/// under the required 2 s.
const SLEEP_SLICE: Duration = Duration::from_millis(500);

/// Monotonic time source and sleeper, injectable so pacing is testable
/// without wall-clock waits.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Monotonic elapsed time since some fixed origin.
    fn now(&self) -> Duration;
    async fn sleep(&self, duration: Duration);
}

/// Real clock backed by `Instant` and `tokio::time`.
#[derive(Debug)]
pub struct TokioClock {
    origin: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Sleep `total` in short slices, polling the stop signal between slices.
/// Returns `false` when the signal cut the sleep short.
pub async fn interruptible_sleep(
    clock: &dyn Clock,
    total: Duration,
    stop: &StopSignal,
) -> bool {
    let deadline = clock.now() + total;
    loop {
        if stop.is_set() {
            return false;
        }
        let now = clock.now();
        if now >= deadline {
            return true;
        }
        let slice = (deadline - now).min(SLEEP_SLICE);
        clock.sleep(slice).await;
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ManualClock;
    use super::*;

    #[tokio::test]
    async fn full_sleep_elapses_requested_duration() {
        let clock = ManualClock::new();
        let stop = StopSignal::new();

        let completed =
            interruptible_sleep(&clock, Duration::from_secs(45), &stop).await;
        assert!(completed);
        assert!(clock.now() >= Duration::from_secs(45));
    }

    #[tokio::test]
    async fn preset_stop_skips_the_sleep_entirely() {
        let clock = ManualClock::new();
        let stop = StopSignal::new();
        stop.set();

        let completed =
            interruptible_sleep(&clock, Duration::from_secs(45), &stop).await;
        assert!(!completed);
        assert_eq!(clock.now(), Duration::ZERO);
    }

    #[tokio::test]
    async fn slices_never_exceed_the_latency_bound() {
        let clock = ManualClock::new();
        let stop = StopSignal::new();

        interruptible_sleep(&clock, Duration::from_secs(3), &stop).await;
        assert!(clock.total_slept() >= Duration::from_secs(3));
        assert!(clock.longest_slice() <= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn zero_duration_completes_immediately() {
        let clock = ManualClock::new();
        let stop = StopSignal::new();
        assert!(interruptible_sleep(&clock, Duration::ZERO, &stop).await);
    }
}
