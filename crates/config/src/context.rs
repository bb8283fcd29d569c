use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The three user inputs a run is started with.
#[derive(Debug, Clone, Default)]
pub struct RunInputs {
    pub self_profile: String,
    pub criteria: String,
    pub template: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Low,
    Medium,
    High,
}

impl Verbosity {
    pub fn as_str(self) -> &'static str {
        match self {
            Verbosity::Low => "low",
            Verbosity::Medium => "medium",
            Verbosity::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Minimal,
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn as_str(self) -> &'static str {
        match self {
            ReasoningEffort::Minimal => "minimal",
            ReasoningEffort::Low => "low",
            ReasoningEffort::Medium => "medium",
            ReasoningEffort::High => "high",
        }
    }
}

/// Optional provider parameters sent with the first attempt of every decision
/// call and stripped wholesale on an unsupported-parameter retry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamBundle {
    pub max_output_tokens: u32,
    pub temperature: Option<f64>,
    pub verbosity: Option<Verbosity>,
    pub reasoning_effort: Option<ReasoningEffort>,
    pub service_tier: Option<String>,
}

/// Everything a run needs, fixed at start.  Built once by
/// [`crate::AppConfig::resolve`] and passed by reference; no component reads
/// the environment or mutates configuration after this point.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub self_profile: String,
    pub criteria: String,
    pub template: String,
    pub listing_url: String,
    pub auto_send: bool,
    pub shadow: bool,
    pub profile_limit: u32,
    pub pace_seconds: u64,
    pub decision_model: String,
    pub cua_model: Option<String>,
    pub params: ParamBundle,
    pub decision_timeout_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_serde_is_lowercase() {
        let json = serde_json::to_string(&Verbosity::Medium).unwrap();
        assert_eq!(json, "\"medium\"");
        let back: Verbosity = serde_json::from_str("\"high\"").unwrap();
        assert_eq!(back, Verbosity::High);
    }

    #[test]
    fn reasoning_effort_serde_roundtrip() {
        for effort in [
            ReasoningEffort::Minimal,
            ReasoningEffort::Low,
            ReasoningEffort::Medium,
            ReasoningEffort::High,
        ] {
            let json = serde_json::to_string(&effort).unwrap();
            let back: ReasoningEffort = serde_json::from_str(&json).unwrap();
            assert_eq!(back, effort);
        }
    }
}
