use std::env;
use std::fs;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod context;
mod selectors;

pub use context::{ParamBundle, ReasoningEffort, RunContext, RunInputs, Verbosity};
pub use selectors::SelectorConfig;

/// Configuration problems that are fatal at startup (CLI exit code 2).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("missing required input: {0}")]
    MissingInput(&'static str),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of the provider API.  Overridden at runtime by the
    /// `OUTREACH_API_BASE` environment variable when set.
    pub base_url: String,
    /// Model used for fit decisions.  Empty means the resolver picks one
    /// from the provider's advertised catalog.
    pub decision_model: String,
    /// Model used for the computer-use planner.  Empty means the resolver
    /// picks one only when planner mode is enabled.
    pub cua_model: String,
    /// Output token budget for a decision call (rationale + draft).
    pub max_output_tokens: u32,
    /// Sampling temperature in [0, 2].  Negative means "not configured".
    pub temperature: f64,
    /// Text verbosity hint, passed nested under the text configuration group.
    pub verbosity: Option<Verbosity>,
    /// Reasoning effort, passed nested under the reasoning group.
    pub reasoning_effort: Option<ReasoningEffort>,
    /// Provider-specific service tier, forwarded verbatim when set.
    pub service_tier: String,
    /// Wall-clock budget for one decision call, in seconds.
    pub decision_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            decision_model: String::new(),
            cua_model: String::new(),
            max_output_tokens: 4_000,
            temperature: -1.0,
            verbosity: None,
            reasoning_effort: None,
            service_tier: String::new(),
            decision_timeout_secs: 60,
        }
    }
}

impl LlmConfig {
    pub fn temperature_opt(&self) -> Option<f64> {
        (self.temperature >= 0.0).then_some(self.temperature)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Listing page the run starts from.
    pub listing_url: String,
    /// Maximum number of profiles processed per run.
    pub profile_limit: u32,
    /// Minimum seconds between two verified sends.
    pub pace_seconds: u64,
    pub daily_quota: u32,
    pub weekly_quota: u32,
    /// Full pipeline without submitting anything.
    pub shadow: bool,
    /// Send on YES without human approval.
    pub auto_send: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            listing_url: String::new(),
            profile_limit: 20,
            pace_seconds: 45,
            daily_quota: 25,
            weekly_quota: 120,
            shadow: false,
            auto_send: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlannerMode {
    Off,
    PlannerExecutor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub planner_mode: PlannerMode,
    /// Hard cap on planner-executor turns per operation.
    pub planner_max_turns: u32,
    /// Per browser operation timeout, in seconds.
    pub operation_timeout_secs: u64,
    /// Window waited after submit before checking the sent marker.
    pub verify_window_secs: u64,
    /// Per computer-use turn timeout, in seconds.
    pub planner_turn_timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            planner_mode: PlannerMode::Off,
            planner_max_turns: 40,
            operation_timeout_secs: 15,
            verify_window_secs: 5,
            planner_turn_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    /// Hard cap on the rendered message length, in characters.
    pub max_chars: usize,
    /// Rendered messages containing any of these are rejected.
    pub banned_phrases: Vec<String>,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            max_chars: 900,
            banned_phrases: vec![
                "as an ai".to_string(),
                "language model".to_string(),
                "{name}".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputsConfig {
    pub self_profile_path: String,
    pub criteria_path: String,
    pub template_path: String,
}

impl Default for InputsConfig {
    fn default() -> Self {
        Self {
            self_profile_path: "inputs/profile.txt".to_string(),
            criteria_path: "inputs/criteria.txt".to_string(),
            template_path: "inputs/template.txt".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the event log and the durable stores.
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: ".outreach".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Login credentials for the target site.
///
/// Never part of the config file and never serialized; read from the
/// environment only and handed to the browser driver's login routine.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> Option<Self> {
        let username = env::var("OUTREACH_SITE_USER").ok()?;
        let password = env::var("OUTREACH_SITE_PASS").ok()?;
        if username.trim().is_empty() || password.is_empty() {
            return None;
        }
        Some(Self { username, password })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub run: RunConfig,
    pub browser: BrowserConfig,
    pub selectors: SelectorConfig,
    pub template: TemplateConfig,
    pub inputs: InputsConfig,
    pub storage: StorageConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)?;
        }

        if let Ok(value) = env::var("OUTREACH_API_BASE") {
            if !value.is_empty() {
                config.llm.base_url = value;
            }
        }
        if let Ok(value) = env::var("OUTREACH_LISTING_URL") {
            if !value.is_empty() {
                config.run.listing_url = value;
            }
        }

        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }

    /// Check option ranges that TOML parsing alone cannot enforce.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run.listing_url.trim().is_empty() {
            return Err(ConfigError::MissingInput("run.listing_url"));
        }
        if self.llm.temperature >= 0.0 && self.llm.temperature > 2.0 {
            return Err(ConfigError::InvalidValue {
                field: "llm.temperature",
                reason: format!("{} is outside [0, 2]", self.llm.temperature),
            });
        }
        if self.llm.max_output_tokens == 0 || self.llm.max_output_tokens > 128_000 {
            return Err(ConfigError::InvalidValue {
                field: "llm.max_output_tokens",
                reason: format!("{} is outside [1, 128000]", self.llm.max_output_tokens),
            });
        }
        if self.run.profile_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "run.profile_limit",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.browser.planner_max_turns == 0 {
            return Err(ConfigError::InvalidValue {
                field: "browser.planner_max_turns",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Build the immutable per-run context from this configuration and the
    /// three user inputs.  `decision_model`/`cua_model` come from the model
    /// resolver, which may override the configured names.
    pub fn resolve(
        &self,
        inputs: RunInputs,
        decision_model: String,
        cua_model: Option<String>,
    ) -> Result<RunContext, ConfigError> {
        self.validate()?;
        if inputs.self_profile.trim().is_empty() {
            return Err(ConfigError::MissingInput("self profile"));
        }
        if inputs.criteria.trim().is_empty() {
            return Err(ConfigError::MissingInput("match criteria"));
        }
        if inputs.template.trim().is_empty() {
            return Err(ConfigError::MissingInput("message template"));
        }

        Ok(RunContext {
            run_id: Uuid::new_v4(),
            self_profile: inputs.self_profile,
            criteria: inputs.criteria,
            template: inputs.template,
            listing_url: self.run.listing_url.clone(),
            auto_send: self.run.auto_send,
            shadow: self.run.shadow,
            profile_limit: self.run.profile_limit,
            pace_seconds: self.run.pace_seconds,
            decision_model,
            cua_model,
            params: ParamBundle {
                max_output_tokens: self.llm.max_output_tokens,
                temperature: self.llm.temperature_opt(),
                verbosity: self.llm.verbosity,
                reasoning_effort: self.llm.reasoning_effort,
                service_tier: (!self.llm.service_tier.is_empty())
                    .then(|| self.llm.service_tier.clone()),
            },
            decision_timeout_secs: self.llm.decision_timeout_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.run.listing_url = "https://example.com/discover".to_string();
        config
    }

    fn inputs() -> RunInputs {
        RunInputs {
            self_profile: "Technical founder, Rust & infra".to_string(),
            criteria: "ML background, US timezone".to_string(),
            template: "Hi {name} — {why_match}. {cta}".to_string(),
        }
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.run.profile_limit, 20);
        assert_eq!(config.run.pace_seconds, 45);
        assert_eq!(config.run.daily_quota, 25);
        assert_eq!(config.run.weekly_quota, 120);
        assert_eq!(config.llm.max_output_tokens, 4_000);
        assert_eq!(config.llm.decision_timeout_secs, 60);
        assert_eq!(config.browser.planner_max_turns, 40);
        assert!(config.llm.temperature_opt().is_none());
    }

    #[test]
    fn load_missing_file_yields_defaults() {
        let config = AppConfig::load_from("/nonexistent/outreach.toml").unwrap();
        assert_eq!(config.run.daily_quota, 25);
    }

    #[test]
    fn save_and_reload_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = valid_config();
        config.run.shadow = true;
        config.llm.temperature = 0.4;
        config.save_to(&path).unwrap();

        let back = AppConfig::load_from(&path).unwrap();
        assert!(back.run.shadow);
        assert_eq!(back.llm.temperature_opt(), Some(0.4));
        assert_eq!(back.run.listing_url, config.run.listing_url);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[run]\nlisting_url = \"https://x.test\"\nshadow = true\n").unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert!(config.run.shadow);
        assert_eq!(config.run.profile_limit, 20);
        assert_eq!(config.llm.max_output_tokens, 4_000);
    }

    #[test]
    fn validate_rejects_out_of_range_temperature() {
        let mut config = valid_config();
        config.llm.temperature = 2.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "llm.temperature", .. })
        ));
    }

    #[test]
    fn validate_rejects_oversized_token_budget() {
        let mut config = valid_config();
        config.llm.max_output_tokens = 200_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_requires_listing_url() {
        let config = AppConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingInput("run.listing_url"))
        ));
    }

    #[test]
    fn resolve_builds_immutable_context() {
        let config = valid_config();
        let ctx = config
            .resolve(inputs(), "decider-1".to_string(), None)
            .unwrap();
        assert_eq!(ctx.decision_model, "decider-1");
        assert_eq!(ctx.profile_limit, 20);
        assert!(ctx.cua_model.is_none());
        assert_eq!(ctx.params.max_output_tokens, 4_000);
    }

    #[test]
    fn resolve_rejects_empty_inputs() {
        let config = valid_config();
        let mut empty = inputs();
        empty.template = "   ".to_string();
        assert!(matches!(
            config.resolve(empty, "m".to_string(), None),
            Err(ConfigError::MissingInput("message template"))
        ));
    }

    #[test]
    fn credentials_debug_redacts_password() {
        let creds = Credentials {
            username: "founder@example.com".to_string(),
            password: "hunter2".to_string(),
        };
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("founder@example.com"));
        assert!(!rendered.contains("hunter2"));
    }
}
