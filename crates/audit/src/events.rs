use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One observable pipeline step.
///
/// Serialized with `event` as the tag so each JSONL line reads
/// `{"ts":...,"run_id":...,"event":"decision",...}`.  Field names follow the
/// on-disk schema, not Rust conventions, where the two differ.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    RunStart {
        listing_url: String,
        profile_limit: u32,
        shadow: bool,
        auto_send: bool,
    },
    ModelsResolved {
        decision_model: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cua_model: Option<String>,
    },
    LoginRequired,
    AutoLoginSuccess,
    AutoLoginFailed {
        reason: String,
    },
    ProfileExtracted {
        profile: String,
        extracted_len: usize,
        engine: String,
        extract_ms: u64,
    },
    EmptyProfile {
        at_profile: u32,
        engine: String,
        skip_reason: String,
        extract_ms: u64,
    },
    Duplicate {
        hash: String,
    },
    Decision {
        profile: String,
        decision: String,
        rationale: String,
        score: f32,
        confidence: f32,
        engine: String,
        extracted_len: usize,
        decision_json_ok: bool,
        /// Truncated raw reply, present only when parsing failed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        raw_excerpt: Option<String>,
    },
    ModelUsage {
        model: String,
        tokens_in: u64,
        tokens_out: u64,
        cost_est: f64,
    },
    ShadowSend {
        profile: String,
        would_send: bool,
    },
    PendingApproval {
        profile: String,
    },
    Sent {
        profile: String,
        ok: bool,
        mode: String,
        verified: bool,
        retry: u32,
    },
    SendFailed {
        profile: String,
        reason: String,
    },
    QuotaCheck {
        day_used: u32,
        day_limit: u32,
        week_used: u32,
        week_limit: u32,
    },
    QuotaExhausted {
        #[serde(rename = "type")]
        scope: String,
        used: u32,
        limit: u32,
    },
    Stopped {
        #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
        location: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        at_profile: Option<u32>,
        reason: String,
    },
    ProfileProcessingError {
        profile: String,
        error: String,
        stage: String,
    },
    RunComplete {
        reason: String,
    },
    /// Emitted to the in-memory mirror only, when a disk write failed twice.
    EventLogWriteFailed {
        error: String,
    },
}

impl RunEvent {
    /// Stable event name as written to the log.
    pub fn name(&self) -> &'static str {
        match self {
            RunEvent::RunStart { .. } => "run_start",
            RunEvent::ModelsResolved { .. } => "models_resolved",
            RunEvent::LoginRequired => "login_required",
            RunEvent::AutoLoginSuccess => "auto_login_success",
            RunEvent::AutoLoginFailed { .. } => "auto_login_failed",
            RunEvent::ProfileExtracted { .. } => "profile_extracted",
            RunEvent::EmptyProfile { .. } => "empty_profile",
            RunEvent::Duplicate { .. } => "duplicate",
            RunEvent::Decision { .. } => "decision",
            RunEvent::ModelUsage { .. } => "model_usage",
            RunEvent::ShadowSend { .. } => "shadow_send",
            RunEvent::PendingApproval { .. } => "pending_approval",
            RunEvent::Sent { .. } => "sent",
            RunEvent::SendFailed { .. } => "send_failed",
            RunEvent::QuotaCheck { .. } => "quota_check",
            RunEvent::QuotaExhausted { .. } => "quota_exhausted",
            RunEvent::Stopped { .. } => "stopped",
            RunEvent::ProfileProcessingError { .. } => "profile_processing_error",
            RunEvent::RunComplete { .. } => "run_complete",
            RunEvent::EventLogWriteFailed { .. } => "event_log_write_failed",
        }
    }
}

/// Envelope written as one JSONL line: timestamp + run id + flattened event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub ts: DateTime<Utc>,
    pub run_id: Uuid,
    #[serde(flatten)]
    pub event: RunEvent,
}

impl EventRecord {
    pub fn new(run_id: Uuid, event: RunEvent) -> Self {
        Self {
            ts: Utc::now(),
            run_id,
            event,
        }
    }
}
