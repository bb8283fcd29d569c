use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Per-run counters and timings.  All increments are relaxed atomics; the
/// struct is shared by reference across the pipeline.
#[derive(Debug, Default)]
pub struct Metrics {
    pub profiles_scanned: AtomicU64,
    pub profiles_extracted: AtomicU64,
    pub empty_profiles: AtomicU64,
    pub duplicates: AtomicU64,
    pub decisions_yes: AtomicU64,
    pub decisions_no: AtomicU64,
    pub decisions_error: AtomicU64,
    pub sends_ok: AtomicU64,
    pub sends_failed: AtomicU64,
    pub shadow_sends: AtomicU64,
    pub pending_approvals: AtomicU64,
    pub quota_blocks: AtomicU64,
    pub stop_events: AtomicU64,
    pub provider_calls: AtomicU64,
    pub provider_retries: AtomicU64,
    extract_ms_total: AtomicU64,
    decision_ms_total: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_extract_ms(&self, ms: u64) {
        self.extract_ms_total.fetch_add(ms, Ordering::Relaxed);
    }

    pub fn record_decision_ms(&self, ms: u64) {
        self.decision_ms_total.fetch_add(ms, Ordering::Relaxed);
    }

    pub fn summary(&self) -> RunSummary {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        let extracted = load(&self.profiles_extracted);
        let decisions =
            load(&self.decisions_yes) + load(&self.decisions_no) + load(&self.decisions_error);
        RunSummary {
            profiles_scanned: load(&self.profiles_scanned),
            profiles_extracted: extracted,
            empty_profiles: load(&self.empty_profiles),
            duplicates: load(&self.duplicates),
            decisions_yes: load(&self.decisions_yes),
            decisions_no: load(&self.decisions_no),
            decisions_error: load(&self.decisions_error),
            sends_ok: load(&self.sends_ok),
            sends_failed: load(&self.sends_failed),
            shadow_sends: load(&self.shadow_sends),
            pending_approvals: load(&self.pending_approvals),
            quota_blocks: load(&self.quota_blocks),
            stop_events: load(&self.stop_events),
            provider_calls: load(&self.provider_calls),
            provider_retries: load(&self.provider_retries),
            avg_extract_ms: avg(load(&self.extract_ms_total), extracted),
            avg_decision_ms: avg(load(&self.decision_ms_total), decisions),
        }
    }
}

fn avg(total: u64, count: u64) -> u64 {
    if count == 0 { 0 } else { total / count }
}

/// Point-in-time snapshot of [`Metrics`], logged at `run_complete` and
/// printed by the CLI.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RunSummary {
    pub profiles_scanned: u64,
    pub profiles_extracted: u64,
    pub empty_profiles: u64,
    pub duplicates: u64,
    pub decisions_yes: u64,
    pub decisions_no: u64,
    pub decisions_error: u64,
    pub sends_ok: u64,
    pub sends_failed: u64,
    pub shadow_sends: u64,
    pub pending_approvals: u64,
    pub quota_blocks: u64,
    pub stop_events: u64,
    pub provider_calls: u64,
    pub provider_retries: u64,
    pub avg_extract_ms: u64,
    pub avg_decision_ms: u64,
}
