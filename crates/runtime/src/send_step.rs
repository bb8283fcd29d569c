//! The guarded send sub-pipeline:
//! quota → stop → focus → fill → stop → submit → verify → retry → pace.

use std::time::Duration;

use outreach_audit::{EventLog, Metrics, RunEvent};
use outreach_browser::{BrowserDriver, BrowserError};
use outreach_store::QuotaStore;

use crate::clock::{Clock, interruptible_sleep};
use crate::stop::StopSignal;

/// How a send attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Verified on attempt `retry` (0 = first submit).
    Sent { retry: u32 },
    /// Stop signal observed at the named poll point; nothing was sent.
    Stopped { location: &'static str },
    QuotaExhausted,
    Failed { reason: String },
}

pub struct SendStep<'a> {
    pub driver: &'a dyn BrowserDriver,
    pub quota: &'a QuotaStore,
    pub log: &'a EventLog,
    pub metrics: &'a Metrics,
    pub clock: &'a dyn Clock,
    pub stop: &'a StopSignal,
    /// Minimum seconds between verified sends.
    pub pace: Duration,
}

impl SendStep<'_> {
    /// Run the full gate sequence for one draft.  `profile` is the
    /// fingerprint used in events.
    ///
    /// The quota reservation taken up front is returned on every path that
    /// does not end in a verified send, so counters track messages that
    /// actually went out.
    pub async fn run(&self, profile: &str, draft: &str) -> SendOutcome {
        if self.stop.is_set() {
            return self.stopped("send_start").await;
        }

        let decision = match self.quota.try_consume() {
            Ok(decision) => decision,
            Err(err) => {
                return self.failed(profile, format!("quota store: {err}")).await;
            }
        };
        self.log
            .emit(RunEvent::QuotaCheck {
                day_used: decision.counters.day_used,
                day_limit: decision.counters.day_limit,
                week_used: decision.counters.week_used,
                week_limit: decision.counters.week_limit,
            })
            .await;
        if !decision.allowed {
            Metrics::inc(&self.metrics.quota_blocks);
            let scope = decision.blocked_by.unwrap_or("day");
            let (used, limit) = if scope == "day" {
                (decision.counters.day_used, decision.counters.day_limit)
            } else {
                (decision.counters.week_used, decision.counters.week_limit)
            };
            self.log
                .emit(RunEvent::QuotaExhausted {
                    scope: scope.to_string(),
                    used,
                    limit,
                })
                .await;
            return SendOutcome::QuotaExhausted;
        }

        if self.stop.is_set() {
            self.release_quota();
            return self.stopped("before_focus").await;
        }

        if let Err(err) = self.driver.focus_input().await {
            self.release_quota();
            return self.failed(profile, format!("focus_input: {err}")).await;
        }
        if let Err(err) = self.driver.fill(draft).await {
            self.release_quota();
            return self.failed(profile, format!("fill: {err}")).await;
        }

        if self.stop.is_set() {
            self.release_quota();
            return self.stopped("before_submit").await;
        }

        if let Err(err) = self.driver.submit().await {
            self.release_quota();
            return self.failed(profile, format!("submit: {err}")).await;
        }

        let mut retry = 0u32;
        let mut verified = self.verify(profile).await;
        if let Err(outcome) = &verified {
            return outcome.clone();
        }

        if verified == Ok(false) {
            if self.stop.is_set() {
                self.release_quota();
                return self.stopped("before_retry").await;
            }
            retry = 1;
            if let Err(err) = self.driver.submit().await {
                self.release_quota();
                return self.failed(profile, format!("resubmit: {err}")).await;
            }
            verified = self.verify(profile).await;
            if let Err(outcome) = &verified {
                return outcome.clone();
            }
        }

        if verified != Ok(true) {
            self.release_quota();
            Metrics::inc(&self.metrics.sends_failed);
            self.log
                .emit(RunEvent::SendFailed {
                    profile: profile.to_string(),
                    reason: "no confirmation after retry".to_string(),
                })
                .await;
            return SendOutcome::Failed {
                reason: "unverified".to_string(),
            };
        }

        Metrics::inc(&self.metrics.sends_ok);
        self.log
            .emit(RunEvent::Sent {
                profile: profile.to_string(),
                ok: true,
                mode: "auto".to_string(),
                verified: true,
                retry,
            })
            .await;

        // Pacing: never two sends closer than the configured minimum.  A
        // stop here ends the wait, not the already-performed send.
        interruptible_sleep(self.clock, self.pace, self.stop).await;

        SendOutcome::Sent { retry }
    }

    async fn verify(&self, profile: &str) -> Result<bool, SendOutcome> {
        match self.driver.verify_sent().await {
            Ok(verified) => Ok(verified),
            Err(err) => {
                self.release_quota();
                Err(self.failed(profile, format!("verify_sent: {err}")).await)
            }
        }
    }

    fn release_quota(&self) {
        if let Err(err) = self.quota.release() {
            tracing::warn!(error = %err, "failed to return quota reservation");
        }
    }

    async fn stopped(&self, location: &'static str) -> SendOutcome {
        Metrics::inc(&self.metrics.stop_events);
        self.log
            .emit(RunEvent::Stopped {
                location: Some(location.to_string()),
                at_profile: None,
                reason: "stop_signal".to_string(),
            })
            .await;
        SendOutcome::Stopped { location }
    }

    async fn failed(&self, profile: &str, reason: String) -> SendOutcome {
        Metrics::inc(&self.metrics.sends_failed);
        self.log
            .emit(RunEvent::SendFailed {
                profile: profile.to_string(),
                reason: reason.clone(),
            })
            .await;
        SendOutcome::Failed { reason }
    }
}

/// Shared helper: one browser error is worth one local retry before the
/// failure propagates.
pub async fn with_one_retry<T, F, Fut>(mut op: F, pause: Duration) -> Result<T, BrowserError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, BrowserError>>,
{
    match op().await {
        Ok(value) => Ok(value),
        Err(first) => {
            tracing::debug!(error = %first, "browser operation failed — retrying once");
            tokio::time::sleep(pause).await;
            op().await
        }
    }
}
