//! The per-run pipeline: one sequential loop over profiles, safety gates
//! applied in a fixed order, every observable step mirrored to the event
//! log.  Failures are contained per profile; only startup problems abort
//! the run.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use outreach_audit::{EventLog, Metrics, RunEvent, RunSummary};
use outreach_browser::{BrowserDriver, BrowserError, LoginPath, extract_name};
use outreach_config::{RunContext, TemplateConfig};
use outreach_engine::{Decision, Evaluator, SlotValues, fingerprint, render_message};
use outreach_llm::estimate_cost;
use outreach_store::{QuotaStore, SeenStore};

use crate::clock::Clock;
use crate::send_step::{SendOutcome, SendStep, with_one_retry};
use crate::stop::StopSignal;

/// Pause between the two profile-text read attempts.
const READ_RETRY_PAUSE: Duration = Duration::from_secs(1);

/// Why a run ended.  Doubles as the CLI's exit-code source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEndReason {
    /// Listing exhausted or profile limit reached.
    Exhausted,
    Quota,
    Stopped,
    LoginRequired,
}

impl RunEndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunEndReason::Exhausted => "exhausted",
            RunEndReason::Quota => "quota",
            RunEndReason::Stopped => "stopped",
            RunEndReason::LoginRequired => "login_required",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub reason: RunEndReason,
    pub summary: RunSummary,
}

pub struct Coordinator {
    pub driver: Arc<dyn BrowserDriver>,
    pub evaluator: Arc<dyn Evaluator>,
    pub seen: Arc<SeenStore>,
    pub quota: Arc<QuotaStore>,
    pub log: Arc<EventLog>,
    pub metrics: Arc<Metrics>,
    pub clock: Arc<dyn Clock>,
    pub stop: StopSignal,
    pub template_config: TemplateConfig,
}

impl Coordinator {
    pub async fn run(&self, ctx: &RunContext) -> Result<RunReport> {
        self.log
            .emit(RunEvent::RunStart {
                listing_url: ctx.listing_url.clone(),
                profile_limit: ctx.profile_limit,
                shadow: ctx.shadow,
                auto_send: ctx.auto_send,
            })
            .await;

        match self.driver.open(&ctx.listing_url).await {
            Ok(LoginPath::AlreadySignedIn) => {}
            Ok(LoginPath::ScriptedLogin) => {
                self.log.emit(RunEvent::AutoLoginSuccess).await;
            }
            Err(BrowserError::LoginRequired) => {
                self.log.emit(RunEvent::LoginRequired).await;
                return Ok(self.report(RunEndReason::LoginRequired));
            }
            Err(BrowserError::LoginFailed(reason)) => {
                self.log
                    .emit(RunEvent::AutoLoginFailed { reason })
                    .await;
                self.log.emit(RunEvent::LoginRequired).await;
                return Ok(self.report(RunEndReason::LoginRequired));
            }
            Err(err) => return Err(err.into()),
        }

        let mut reason = RunEndReason::Exhausted;

        for at_profile in 0..ctx.profile_limit {
            if self.stop.is_set() {
                Metrics::inc(&self.metrics.stop_events);
                self.log
                    .emit(RunEvent::Stopped {
                        location: None,
                        at_profile: Some(at_profile),
                        reason: "stop_signal".to_string(),
                    })
                    .await;
                reason = RunEndReason::Stopped;
                break;
            }

            match self.process_profile(ctx, at_profile).await {
                ProfileOutcome::Continue => {}
                ProfileOutcome::NoMoreProfiles => break,
                ProfileOutcome::Stopped => {
                    reason = RunEndReason::Stopped;
                    break;
                }
                ProfileOutcome::QuotaExhausted => {
                    reason = RunEndReason::Quota;
                    break;
                }
            }
        }

        if matches!(reason, RunEndReason::Exhausted | RunEndReason::Quota) {
            self.log
                .emit(RunEvent::RunComplete {
                    reason: reason.as_str().to_string(),
                })
                .await;
        }

        let report = self.report(reason);
        tracing::info!(reason = report.reason.as_str(), summary = ?report.summary, "run finished");
        Ok(report)
    }

    async fn process_profile(&self, ctx: &RunContext, at_profile: u32) -> ProfileOutcome {
        let engine = self.driver.engine().to_string();

        // Advance the listing.
        let opened = with_one_retry(|| self.driver.open_next_profile(), READ_RETRY_PAUSE).await;
        let has_profile = match opened {
            Ok(has) => has,
            Err(err) => {
                self.profile_error("", "open_next_profile", &err.to_string())
                    .await;
                return ProfileOutcome::Continue;
            }
        };
        if !has_profile {
            return ProfileOutcome::NoMoreProfiles;
        }
        Metrics::inc(&self.metrics.profiles_scanned);

        // Extract the card text; one paced retry before giving up.
        let started = self.clock.now();
        let mut read = self.driver.read_profile_text().await;
        if !matches!(&read, Ok(text) if !text.trim().is_empty()) {
            self.clock.sleep(READ_RETRY_PAUSE).await;
            read = self.driver.read_profile_text().await;
        }
        let extract_ms = (self.clock.now() - started).as_millis() as u64;
        self.metrics.record_extract_ms(extract_ms);

        let text = match read {
            Ok(text) if !text.trim().is_empty() => text,
            other => {
                let skip_reason = match other {
                    Err(err) => err.to_string(),
                    _ => "empty_text".to_string(),
                };
                Metrics::inc(&self.metrics.empty_profiles);
                self.log
                    .emit(RunEvent::EmptyProfile {
                        at_profile,
                        engine,
                        skip_reason,
                        extract_ms,
                    })
                    .await;
                self.skip_quietly().await;
                return ProfileOutcome::Continue;
            }
        };

        let fp = fingerprint(&text);
        Metrics::inc(&self.metrics.profiles_extracted);
        self.log
            .emit(RunEvent::ProfileExtracted {
                profile: fp.clone(),
                extracted_len: text.len(),
                engine: engine.clone(),
                extract_ms,
            })
            .await;

        // Dedupe before spending provider tokens.
        match self.seen.is_seen(&fp) {
            Ok(true) => {
                Metrics::inc(&self.metrics.duplicates);
                self.log.emit(RunEvent::Duplicate { hash: fp }).await;
                self.skip_quietly().await;
                return ProfileOutcome::Continue;
            }
            Ok(false) => {}
            Err(err) => {
                self.profile_error(&fp, "seen_store", &err.to_string()).await;
                self.skip_quietly().await;
                return ProfileOutcome::Continue;
            }
        }

        // Evaluate.  The provider call is a suspension point: a stop set
        // mid-call abandons the evaluation rather than waiting out the
        // provider budget.
        let decision_started = self.clock.now();
        let outcome = tokio::select! {
            biased;
            outcome = self.evaluator.evaluate(ctx, &text) => outcome,
            _ = self.stop.wait_until_set() => {
                Metrics::inc(&self.metrics.stop_events);
                self.log
                    .emit(RunEvent::Stopped {
                        location: Some("during_decision".to_string()),
                        at_profile: Some(at_profile),
                        reason: "stop_signal".to_string(),
                    })
                    .await;
                return ProfileOutcome::Stopped;
            }
        };
        self.metrics
            .record_decision_ms((self.clock.now() - decision_started).as_millis() as u64);
        Metrics::inc(&self.metrics.provider_calls);

        if let Some(usage) = &outcome.usage {
            for _ in 0..usage.retries {
                Metrics::inc(&self.metrics.provider_retries);
            }
            self.log
                .emit(RunEvent::ModelUsage {
                    model: usage.model.clone(),
                    tokens_in: usage.usage.input_tokens,
                    tokens_out: usage.usage.output_tokens,
                    cost_est: estimate_cost(&usage.model, &usage.usage),
                })
                .await;
        }

        let verdict = outcome.verdict.validated();
        match verdict.decision {
            Decision::Yes => Metrics::inc(&self.metrics.decisions_yes),
            Decision::No => Metrics::inc(&self.metrics.decisions_no),
            Decision::Error => Metrics::inc(&self.metrics.decisions_error),
        }
        self.log
            .emit(RunEvent::Decision {
                profile: fp.clone(),
                decision: verdict.decision.as_str().to_string(),
                rationale: verdict.rationale.clone(),
                score: verdict.score,
                confidence: verdict.confidence,
                engine: engine.clone(),
                extracted_len: text.len(),
                decision_json_ok: verdict.json_ok,
                raw_excerpt: outcome.raw_excerpt.clone(),
            })
            .await;

        if verdict.decision != Decision::Yes {
            self.skip_quietly().await;
            return ProfileOutcome::Continue;
        }

        // YES path: render the outgoing message, then gate the send.
        let slots = SlotValues::from_verdict(&verdict, extract_name(&text).as_deref());
        let message = match render_message(&ctx.template, &verdict, &slots, &self.template_config)
        {
            Ok(message) => message,
            Err(err) => {
                self.profile_error(&fp, "render_message", &err.to_string())
                    .await;
                self.skip_quietly().await;
                return ProfileOutcome::Continue;
            }
        };

        if ctx.shadow {
            Metrics::inc(&self.metrics.shadow_sends);
            self.log
                .emit(RunEvent::ShadowSend {
                    profile: fp.clone(),
                    would_send: true,
                })
                .await;
            self.mark_seen(&fp).await;
            self.skip_quietly().await;
            return ProfileOutcome::Continue;
        }

        if !ctx.auto_send {
            Metrics::inc(&self.metrics.pending_approvals);
            self.log
                .emit(RunEvent::PendingApproval { profile: fp.clone() })
                .await;
            self.skip_quietly().await;
            return ProfileOutcome::Continue;
        }

        let step = SendStep {
            driver: self.driver.as_ref(),
            quota: self.quota.as_ref(),
            log: self.log.as_ref(),
            metrics: self.metrics.as_ref(),
            clock: self.clock.as_ref(),
            stop: &self.stop,
            pace: Duration::from_secs(ctx.pace_seconds),
        };
        match step.run(&fp, &message).await {
            SendOutcome::Sent { .. } => {
                self.mark_seen(&fp).await;
                ProfileOutcome::Continue
            }
            SendOutcome::Stopped { .. } => ProfileOutcome::Stopped,
            SendOutcome::QuotaExhausted => ProfileOutcome::QuotaExhausted,
            SendOutcome::Failed { .. } => {
                self.skip_quietly().await;
                ProfileOutcome::Continue
            }
        }
    }

    async fn mark_seen(&self, fp: &str) {
        if let Err(err) = self.seen.mark_seen(fp) {
            self.profile_error(fp, "mark_seen", &err.to_string()).await;
        }
    }

    /// Dismiss the current card; a failed dismissal is logged, not fatal —
    /// the dedupe gate absorbs any re-encounter.
    async fn skip_quietly(&self) {
        if let Err(err) = self.driver.skip().await {
            tracing::warn!(error = %err, "skip failed");
        }
    }

    async fn profile_error(&self, profile: &str, stage: &str, error: &str) {
        tracing::warn!(profile, stage, error, "profile processing error");
        self.log
            .emit(RunEvent::ProfileProcessingError {
                profile: profile.to_string(),
                error: error.to_string(),
                stage: stage.to_string(),
            })
            .await;
    }

    fn report(&self, reason: RunEndReason) -> RunReport {
        RunReport {
            reason,
            summary: self.metrics.summary(),
        }
    }
}

enum ProfileOutcome {
    Continue,
    NoMoreProfiles,
    Stopped,
    QuotaExhausted,
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use uuid::Uuid;

    use outreach_audit::load_records;
    use outreach_config::{AppConfig, RunInputs};
    use outreach_engine::{EvaluationOutcome, UsageReport, Verdict};
    use outreach_llm::Usage;

    use crate::clock::testing::ManualClock;

    const ALICE: &str = "Alice, Python & ML, NYC";

    // ── scripted collaborators ─────────────────────────────────────────────

    #[derive(Default)]
    struct ScriptedDriver {
        profiles: Mutex<VecDeque<String>>,
        current: Mutex<Option<String>>,
        verify: Mutex<VecDeque<bool>>,
        stop_on_fill: Mutex<Option<StopSignal>>,
        submits: AtomicU32,
        skips: AtomicU32,
        fills: Mutex<Vec<String>>,
    }

    impl ScriptedDriver {
        fn new(profiles: &[&str]) -> Self {
            Self {
                profiles: Mutex::new(profiles.iter().map(ToString::to_string).collect()),
                ..Self::default()
            }
        }

        fn with_verify(self, script: &[bool]) -> Self {
            *self.verify.lock().unwrap() = script.iter().copied().collect();
            self
        }

        fn with_stop_on_fill(self, stop: StopSignal) -> Self {
            *self.stop_on_fill.lock().unwrap() = Some(stop);
            self
        }
    }

    #[async_trait]
    impl BrowserDriver for ScriptedDriver {
        async fn open(&self, _url: &str) -> Result<LoginPath, BrowserError> {
            Ok(LoginPath::AlreadySignedIn)
        }

        async fn open_next_profile(&self) -> Result<bool, BrowserError> {
            match self.profiles.lock().unwrap().pop_front() {
                Some(profile) => {
                    *self.current.lock().unwrap() = Some(profile);
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        async fn read_profile_text(&self) -> Result<String, BrowserError> {
            Ok(self.current.lock().unwrap().clone().unwrap_or_default())
        }

        async fn focus_input(&self) -> Result<(), BrowserError> {
            Ok(())
        }

        async fn fill(&self, text: &str) -> Result<(), BrowserError> {
            self.fills.lock().unwrap().push(text.to_string());
            if let Some(stop) = self.stop_on_fill.lock().unwrap().as_ref() {
                stop.set();
            }
            Ok(())
        }

        async fn submit(&self) -> Result<(), BrowserError> {
            self.submits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn verify_sent(&self) -> Result<bool, BrowserError> {
            Ok(self.verify.lock().unwrap().pop_front().unwrap_or(true))
        }

        async fn skip(&self) -> Result<(), BrowserError> {
            self.skips.fetch_add(1, Ordering::SeqCst);
            *self.current.lock().unwrap() = None;
            Ok(())
        }

        async fn close(&self) -> Result<(), BrowserError> {
            Ok(())
        }
    }

    struct ScriptedEvaluator {
        outcomes: Mutex<VecDeque<EvaluationOutcome>>,
    }

    impl ScriptedEvaluator {
        fn new(outcomes: Vec<EvaluationOutcome>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
            }
        }
    }

    #[async_trait]
    impl Evaluator for ScriptedEvaluator {
        async fn evaluate(&self, _ctx: &RunContext, _profile_text: &str) -> EvaluationOutcome {
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| EvaluationOutcome {
                    verdict: Verdict {
                        decision: Decision::No,
                        rationale: "scripted default".to_string(),
                        draft: String::new(),
                        score: 0.1,
                        confidence: 0.9,
                        json_ok: true,
                    },
                    usage: None,
                    raw_excerpt: None,
                })
        }
    }

    fn yes_outcome(draft: &str, rationale: &str) -> EvaluationOutcome {
        yes_outcome_with_retries(draft, rationale, 0)
    }

    fn yes_outcome_with_retries(draft: &str, rationale: &str, retries: u32) -> EvaluationOutcome {
        EvaluationOutcome {
            verdict: Verdict {
                decision: Decision::Yes,
                rationale: rationale.to_string(),
                draft: draft.to_string(),
                score: 0.82,
                confidence: 0.78,
                json_ok: true,
            },
            usage: Some(UsageReport {
                model: "gpt-5-mini".to_string(),
                usage: Usage {
                    input_tokens: 1_200,
                    output_tokens: 240,
                },
                retries,
            }),
            raw_excerpt: None,
        }
    }

    // ── harness ────────────────────────────────────────────────────────────

    struct Harness {
        _dir: tempfile::TempDir,
        coordinator: Coordinator,
        driver: Arc<ScriptedDriver>,
        clock: Arc<ManualClock>,
        seen: Arc<SeenStore>,
        quota: Arc<QuotaStore>,
        stop: StopSignal,
        log_path: std::path::PathBuf,
    }

    fn harness(driver: ScriptedDriver, evaluator: ScriptedEvaluator) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let seen = Arc::new(SeenStore::open(dir.path().join("seen.redb")).unwrap());
        let quota = Arc::new(QuotaStore::open(dir.path().join("quota.redb"), 25, 120).unwrap());
        let log_path = dir.path().join("events.jsonl");
        let log = Arc::new(EventLog::new(&log_path, Uuid::new_v4()));
        let clock = Arc::new(ManualClock::new());
        let stop = StopSignal::new();
        let driver = Arc::new(driver);

        let coordinator = Coordinator {
            driver: driver.clone(),
            evaluator: Arc::new(evaluator),
            seen: seen.clone(),
            quota: quota.clone(),
            log,
            metrics: Arc::new(Metrics::new()),
            clock: clock.clone(),
            stop: stop.clone(),
            template_config: TemplateConfig::default(),
        };

        Harness {
            _dir: dir,
            coordinator,
            driver,
            clock,
            seen,
            quota,
            stop,
            log_path,
        }
    }

    fn ctx(profile_limit: u32, auto_send: bool, shadow: bool) -> RunContext {
        let mut config = AppConfig::default();
        config.run.listing_url = "https://example.test/discover".to_string();
        config.run.profile_limit = profile_limit;
        config.run.auto_send = auto_send;
        config.run.shadow = shadow;
        config
            .resolve(
                RunInputs {
                    self_profile: "Technical founder, Rust & infra".to_string(),
                    criteria: "ML background, NYC".to_string(),
                    template: "Keep it warm and short.".to_string(),
                },
                "gpt-5-mini".to_string(),
                None,
            )
            .unwrap()
    }

    fn event_names(harness: &Harness) -> Vec<String> {
        load_records(&harness.log_path)
            .unwrap()
            .iter()
            .map(|record| record.event.name().to_string())
            .collect()
    }

    /// Assert `expected` appears in `actual` in order (other events may
    /// be interleaved).
    fn assert_subsequence(actual: &[String], expected: &[&str]) {
        let mut it = actual.iter();
        for want in expected {
            assert!(
                it.any(|name| name == want),
                "event `{want}` missing or out of order in {actual:?}"
            );
        }
    }

    fn count(actual: &[String], name: &str) -> usize {
        actual.iter().filter(|n| *n == name).count()
    }

    // ── end-to-end scenarios ───────────────────────────────────────────────

    #[tokio::test]
    async fn scenario_happy_path_sends_and_completes() {
        let harness = harness(
            ScriptedDriver::new(&[ALICE]),
            ScriptedEvaluator::new(vec![yes_outcome(
                "Hi Alice — saw Python & ML; let's chat.",
                "Strong ML/NYC match",
            )]),
        );

        let report = harness.coordinator.run(&ctx(1, true, false)).await.unwrap();
        assert_eq!(report.reason, RunEndReason::Exhausted);
        assert_eq!(report.summary.sends_ok, 1);

        let names = event_names(&harness);
        assert_subsequence(
            &names,
            &["run_start", "profile_extracted", "decision", "sent", "run_complete"],
        );
        assert_eq!(count(&names, "sent"), 1);

        let records = load_records(&harness.log_path).unwrap();
        let extracted = records
            .iter()
            .find_map(|r| match &r.event {
                RunEvent::ProfileExtracted { extracted_len, .. } => Some(*extracted_len),
                _ => None,
            })
            .unwrap();
        assert_eq!(extracted, ALICE.len());

        let decision = records
            .iter()
            .find_map(|r| match &r.event {
                RunEvent::Decision { decision, .. } => Some(decision.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(decision, "YES");

        assert!(
            records.iter().any(|r| matches!(
                &r.event,
                RunEvent::Sent { ok: true, verified: true, .. }
            ))
        );
        assert!(records.iter().any(|r| matches!(
            &r.event,
            RunEvent::RunComplete { reason } if reason == "exhausted"
        )));

        // Quota consumed exactly once; profile is now seen.
        assert_eq!(harness.quota.snapshot().unwrap().day_used, 1);
        assert!(harness.seen.is_seen(&fingerprint(ALICE)).unwrap());
    }

    #[tokio::test]
    async fn scenario_duplicate_skips_before_decision() {
        let harness = harness(
            ScriptedDriver::new(&[ALICE]),
            ScriptedEvaluator::new(vec![yes_outcome("should never be used", "n/a")]),
        );
        harness.seen.mark_seen(&fingerprint(ALICE)).unwrap();

        let report = harness.coordinator.run(&ctx(1, true, false)).await.unwrap();
        assert_eq!(report.summary.duplicates, 1);

        let names = event_names(&harness);
        assert_subsequence(&names, &["profile_extracted", "duplicate"]);
        assert_eq!(count(&names, "decision"), 0);
        assert_eq!(count(&names, "sent"), 0);
        assert_eq!(harness.driver.skips.load(Ordering::SeqCst), 1);
        assert_eq!(harness.quota.snapshot().unwrap().day_used, 0);
    }

    #[tokio::test]
    async fn scenario_shadow_mode_never_submits() {
        let harness = harness(
            ScriptedDriver::new(&[ALICE]),
            ScriptedEvaluator::new(vec![yes_outcome(
                "Hi Alice — saw Python & ML; let's chat.",
                "Strong ML/NYC match",
            )]),
        );

        let report = harness.coordinator.run(&ctx(1, true, true)).await.unwrap();
        assert_eq!(report.summary.shadow_sends, 1);

        let names = event_names(&harness);
        assert_subsequence(&names, &["decision", "shadow_send"]);
        assert_eq!(count(&names, "sent"), 0);

        let records = load_records(&harness.log_path).unwrap();
        assert!(records.iter().any(|r| matches!(
            &r.event,
            RunEvent::ShadowSend { would_send: true, .. }
        )));

        // Quota untouched; fingerprint recorded anyway.
        assert_eq!(harness.quota.snapshot().unwrap().day_used, 0);
        assert!(harness.seen.is_seen(&fingerprint(ALICE)).unwrap());
    }

    #[tokio::test]
    async fn scenario_parameter_fallback_still_yields_one_decision() {
        // The engine-level fallback shows up here as a usage report with a
        // retry count; the pipeline must emit exactly one model_usage and
        // one decision for the profile.
        let harness = harness(
            ScriptedDriver::new(&[ALICE]),
            ScriptedEvaluator::new(vec![yes_outcome_with_retries(
                "Hi Alice — saw Python & ML; let's chat.",
                "Strong ML/NYC match",
                1,
            )]),
        );

        let report = harness.coordinator.run(&ctx(1, true, false)).await.unwrap();
        assert_eq!(report.summary.provider_retries, 1);

        let names = event_names(&harness);
        assert_eq!(count(&names, "model_usage"), 1);
        assert_eq!(count(&names, "decision"), 1);

        let records = load_records(&harness.log_path).unwrap();
        assert!(records.iter().any(|r| matches!(
            &r.event,
            RunEvent::Decision { decision_json_ok: true, .. }
        )));
    }

    #[tokio::test]
    async fn scenario_verification_retry_resubmits_once() {
        let driver = ScriptedDriver::new(&[ALICE]).with_verify(&[false, true]);
        let harness = harness(
            driver,
            ScriptedEvaluator::new(vec![yes_outcome(
                "Hi Alice — saw Python & ML; let's chat.",
                "Strong ML/NYC match",
            )]),
        );

        let report = harness.coordinator.run(&ctx(1, true, false)).await.unwrap();
        assert_eq!(report.summary.sends_ok, 1);

        let records = load_records(&harness.log_path).unwrap();
        let retry = records
            .iter()
            .find_map(|r| match &r.event {
                RunEvent::Sent { retry, verified, ok, .. } => {
                    assert!(*ok && *verified);
                    Some(*retry)
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(retry, 1);
        // Two submits: the original and the one retry.
        assert_eq!(harness.driver.submits.load(Ordering::SeqCst), 2);

        // Pacing elapsed on the injected clock before the run returned.
        assert!(harness.clock.total_slept() >= Duration::from_secs(45));
    }

    #[tokio::test]
    async fn scenario_stop_between_fill_and_submit_sends_nothing() {
        let stop = StopSignal::new();
        let driver = ScriptedDriver::new(&[ALICE]).with_stop_on_fill(stop.clone());
        let mut harness = harness(
            driver,
            ScriptedEvaluator::new(vec![yes_outcome(
                "Hi Alice — saw Python & ML; let's chat.",
                "Strong ML/NYC match",
            )]),
        );
        harness.stop = stop.clone();
        harness.coordinator.stop = stop;

        let report = harness.coordinator.run(&ctx(1, true, false)).await.unwrap();
        assert_eq!(report.reason, RunEndReason::Stopped);

        let records = load_records(&harness.log_path).unwrap();
        assert!(records.iter().any(|r| matches!(
            &r.event,
            RunEvent::Stopped { location: Some(location), .. } if location == "before_submit"
        )));
        let names = event_names(&harness);
        assert_eq!(count(&names, "sent"), 0);
        assert_eq!(harness.driver.submits.load(Ordering::SeqCst), 0);

        // The reservation taken before focus was returned.
        assert_eq!(harness.quota.snapshot().unwrap().day_used, 0);
    }

    // ── property checks ────────────────────────────────────────────────────

    #[tokio::test]
    async fn decision_always_precedes_sent_for_a_profile() {
        let harness = harness(
            ScriptedDriver::new(&[ALICE, "Bob, Go & infra, SF"]),
            ScriptedEvaluator::new(vec![
                yes_outcome("Hi Alice!", "fit"),
                yes_outcome("Hi Bob!", "fit"),
            ]),
        );

        harness.coordinator.run(&ctx(2, true, false)).await.unwrap();

        let records = load_records(&harness.log_path).unwrap();
        for (idx, record) in records.iter().enumerate() {
            if let RunEvent::Sent { profile, .. } = &record.event {
                let decided_before = records[..idx].iter().any(|r| matches!(
                    &r.event,
                    RunEvent::Decision { profile: p, .. } if p == profile
                ));
                assert!(decided_before, "sent without a prior decision for {profile}");
            }
        }
    }

    #[tokio::test]
    async fn stop_before_iteration_emits_stopped_and_no_sent() {
        let harness = harness(
            ScriptedDriver::new(&[ALICE]),
            ScriptedEvaluator::new(vec![yes_outcome("Hi!", "fit")]),
        );
        harness.stop.set();

        let report = harness.coordinator.run(&ctx(1, true, false)).await.unwrap();
        assert_eq!(report.reason, RunEndReason::Stopped);

        let names = event_names(&harness);
        assert_eq!(count(&names, "sent"), 0);
        let records = load_records(&harness.log_path).unwrap();
        assert!(records.iter().any(|r| matches!(
            &r.event,
            RunEvent::Stopped { at_profile: Some(0), .. }
        )));
    }

    #[tokio::test]
    async fn yes_with_empty_draft_never_sends() {
        let outcome = EvaluationOutcome {
            verdict: Verdict {
                decision: Decision::Yes,
                rationale: "confident but empty".to_string(),
                draft: String::new(),
                score: 0.9,
                confidence: 0.9,
                json_ok: true,
            },
            usage: None,
            raw_excerpt: None,
        };
        let harness = harness(
            ScriptedDriver::new(&[ALICE]),
            ScriptedEvaluator::new(vec![outcome]),
        );

        let report = harness.coordinator.run(&ctx(1, true, false)).await.unwrap();
        assert_eq!(report.summary.decisions_error, 1);

        let names = event_names(&harness);
        assert_eq!(count(&names, "sent"), 0);
        let records = load_records(&harness.log_path).unwrap();
        assert!(records.iter().any(|r| matches!(
            &r.event,
            RunEvent::Decision { decision, .. } if decision == "ERROR"
        )));
    }

    #[tokio::test]
    async fn manual_approval_mode_emits_pending_and_holds() {
        let harness = harness(
            ScriptedDriver::new(&[ALICE]),
            ScriptedEvaluator::new(vec![yes_outcome("Hi Alice!", "fit")]),
        );

        let report = harness.coordinator.run(&ctx(1, false, false)).await.unwrap();
        assert_eq!(report.summary.pending_approvals, 1);

        let names = event_names(&harness);
        assert_subsequence(&names, &["decision", "pending_approval"]);
        assert_eq!(count(&names, "sent"), 0);
        assert_eq!(harness.quota.snapshot().unwrap().day_used, 0);
    }

    #[tokio::test]
    async fn empty_profile_is_skipped_and_run_continues() {
        let harness = harness(
            ScriptedDriver::new(&["   ", "Bob, Go & infra, SF"]),
            ScriptedEvaluator::new(vec![yes_outcome("Hi Bob!", "fit")]),
        );

        let report = harness.coordinator.run(&ctx(2, true, false)).await.unwrap();
        assert_eq!(report.summary.empty_profiles, 1);
        assert_eq!(report.summary.sends_ok, 1);

        let names = event_names(&harness);
        assert_subsequence(&names, &["empty_profile", "profile_extracted", "sent"]);
    }

    #[tokio::test]
    async fn negative_verdict_never_reaches_send() {
        let harness = harness(
            ScriptedDriver::new(&[ALICE]),
            ScriptedEvaluator::new(vec![]),
        );

        let report = harness.coordinator.run(&ctx(1, true, false)).await.unwrap();
        assert_eq!(report.summary.decisions_no, 1);
        let names = event_names(&harness);
        assert_eq!(count(&names, "sent"), 0);
        assert_eq!(count(&names, "quota_check"), 0);
    }

    #[tokio::test]
    async fn listing_exhaustion_completes_run() {
        let harness = harness(ScriptedDriver::new(&[]), ScriptedEvaluator::new(vec![]));

        let report = harness.coordinator.run(&ctx(5, true, false)).await.unwrap();
        assert_eq!(report.reason, RunEndReason::Exhausted);

        let records = load_records(&harness.log_path).unwrap();
        assert!(records.iter().any(|r| matches!(
            &r.event,
            RunEvent::RunComplete { reason } if reason == "exhausted"
        )));
    }
}
