use std::future::Future;
use std::time::{Duration, Instant};

use crate::error::LlmError;

/// Exponential backoff schedule for transient provider failures.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub initial: Duration,
    pub factor: u32,
    pub max_delay: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(2),
            factor: 2,
            max_delay: Duration::from_secs(8),
            max_retries: 2,
        }
    }
}

impl Backoff {
    /// Delay before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = self.factor.saturating_pow(retry.saturating_sub(1));
        self.initial
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// Run `op`, retrying transient failures per the schedule.  Non-transient
/// errors are returned immediately.  Returns the retry count actually used
/// alongside the result so callers can report it.
pub async fn retry_transient<T, F, Fut>(
    policy: Backoff,
    mut op: F,
) -> (Result<T, LlmError>, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut retries = 0u32;
    loop {
        match op().await {
            Ok(value) => return (Ok(value), retries),
            Err(err) if err.is_transient() && retries < policy.max_retries => {
                retries += 1;
                let delay = policy.delay(retries);
                tracing::warn!(
                    retry = retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient provider failure — backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return (Err(err), retries),
        }
    }
}

/// Trip-after-N-consecutive-failures breaker shared by the decision engine
/// and the browser driver's planner.  Open state expires after a cooldown;
/// any success closes it.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cooldown,
            consecutive_failures: 0,
            open_until: None,
        }
    }

    /// Whether a call may proceed right now.
    pub fn allow(&mut self) -> bool {
        match self.open_until {
            Some(until) if Instant::now() < until => false,
            Some(_) => {
                // Cooldown elapsed — half-open: permit one probe.
                self.open_until = None;
                true
            }
            None => true,
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.open_until = None;
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.failure_threshold {
            self.open_until = Some(Instant::now() + self.cooldown);
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.open_until, Some(until) if Instant::now() < until)
    }
}
