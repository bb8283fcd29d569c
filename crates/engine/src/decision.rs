use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use outreach_config::{ParamBundle, RunContext};
use outreach_llm::{
    Backoff, CircuitBreaker, LlmClient, LlmError, ReasoningConfig, ResponseRequest, TextConfig,
    Usage, retry_transient,
};

use crate::verdict::{RAW_EXCERPT_CHARS, Verdict, VerdictWire, parse_verdict, truncate_chars};

/// Token accounting for one evaluation, forwarded as a `model_usage` event.
#[derive(Debug, Clone, Default)]
pub struct UsageReport {
    pub model: String,
    pub usage: Usage,
    pub retries: u32,
}

/// Result of evaluating one candidate profile.
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    pub verdict: Verdict,
    pub usage: Option<UsageReport>,
    /// Truncated raw reply, kept only when parsing failed.
    pub raw_excerpt: Option<String>,
}

impl EvaluationOutcome {
    pub fn error(rationale: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::error(rationale),
            usage: None,
            raw_excerpt: None,
        }
    }
}

/// Seam between the coordinator and the decision machinery, so scenario
/// tests can script verdicts.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, ctx: &RunContext, profile_text: &str) -> EvaluationOutcome;
}

/// Consecutive provider failures before decision calls are refused for a
/// cooldown, instead of burning the retry budget on every profile.
const BREAKER_THRESHOLD: u32 = 5;
const BREAKER_COOLDOWN: Duration = Duration::from_secs(120);

/// LLM-backed [`Evaluator`]: prompt assembly, the provider call policy, and
/// response parsing.
pub struct DecisionEngine {
    client: LlmClient,
    backoff: Backoff,
    breaker: std::sync::Mutex<CircuitBreaker>,
}

impl DecisionEngine {
    pub fn new(client: LlmClient) -> Self {
        Self::with_backoff(client, Backoff::default())
    }

    fn with_backoff(client: LlmClient, backoff: Backoff) -> Self {
        Self {
            client,
            backoff,
            breaker: std::sync::Mutex::new(CircuitBreaker::new(
                BREAKER_THRESHOLD,
                BREAKER_COOLDOWN,
            )),
        }
    }

    /// Full call policy:
    /// 1. first attempt with every optional parameter the model may support,
    /// 2. on an unsupported-parameter rejection, one retry with the bundle
    ///    stripped and a strict-JSON addendum appended,
    /// 3. transient failures retried with backoff inside each attempt,
    /// 4. the whole exchange bounded by the configured wall-clock budget.
    async fn call_provider(
        &self,
        ctx: &RunContext,
        prompt: String,
    ) -> Result<(outreach_llm::LlmResponse, u32), LlmError> {
        let full = build_request(&ctx.decision_model, &prompt, &ctx.params, true);

        let (first, mut retries) =
            retry_transient(self.backoff, || self.client.respond(&full)).await;

        match first {
            Ok(response) => Ok((response, retries)),
            Err(LlmError::UnsupportedParameter { param, .. }) => {
                tracing::info!(
                    param = %param,
                    "optional parameter unsupported — retrying without the bundle"
                );
                let strict_prompt = format!("{prompt}\n\n{STRICT_JSON_ADDENDUM}");
                let stripped =
                    build_request(&ctx.decision_model, &strict_prompt, &ctx.params, false)
                        .without_optional_params();
                let (second, more) =
                    retry_transient(self.backoff, || self.client.respond(&stripped)).await;
                retries += more + 1;
                second.map(|response| (response, retries))
            }
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl Evaluator for DecisionEngine {
    async fn evaluate(&self, ctx: &RunContext, profile_text: &str) -> EvaluationOutcome {
        if !self.breaker.lock().expect("breaker lock").allow() {
            return EvaluationOutcome::error(LlmError::CircuitOpen.to_string());
        }

        let prompt = build_prompt(ctx, profile_text);
        let budget = Duration::from_secs(ctx.decision_timeout_secs);

        let result = tokio::time::timeout(budget, self.call_provider(ctx, prompt)).await;

        let (response, retries) = match result {
            Err(_) => {
                self.breaker.lock().expect("breaker lock").record_failure();
                tracing::warn!(budget_secs = ctx.decision_timeout_secs, "decision call timed out");
                return EvaluationOutcome::error(format!(
                    "provider call exceeded {}s budget",
                    ctx.decision_timeout_secs
                ));
            }
            Ok(Err(err)) => {
                self.breaker.lock().expect("breaker lock").record_failure();
                tracing::warn!(error = %err, "decision call failed");
                return EvaluationOutcome::error(err.to_string());
            }
            Ok(Ok(pair)) => pair,
        };
        self.breaker.lock().expect("breaker lock").record_success();

        let usage = Some(UsageReport {
            model: if response.model.is_empty() {
                ctx.decision_model.clone()
            } else {
                response.model.clone()
            },
            usage: response.usage.clone().unwrap_or_default(),
            retries,
        });

        let text = response.text();
        match parse_verdict(&text) {
            Ok(verdict) => EvaluationOutcome {
                verdict,
                usage,
                raw_excerpt: None,
            },
            Err(excerpt) => EvaluationOutcome {
                verdict: Verdict::error("reply was not valid verdict JSON"),
                usage,
                raw_excerpt: Some(truncate_chars(&excerpt, RAW_EXCERPT_CHARS)),
            },
        }
    }
}

const STRICT_JSON_ADDENDUM: &str = "Return STRICT JSON only: a single object with exactly the \
keys decision, rationale, draft, score, confidence. No code fences, no prose, no extra keys.";

/// One prompt, clearly delimited sections, schema spelled out in the rules.
fn build_prompt(ctx: &RunContext, profile_text: &str) -> String {
    format!(
        "== RULES ==\n\
         You screen candidate co-founder profiles for fit. Judge the CANDIDATE PROFILE \
         against the MATCH CRITERIA from the perspective of the person in YOUR PROFILE. \
         Reply with one JSON object with exactly these keys:\n\
         - decision: \"YES\" | \"NO\" | \"ERROR\"\n\
         - rationale: one or two sentences, at most 280 characters\n\
         - draft: a personalized outreach message following MESSAGE TEMPLATE (empty when decision is NO)\n\
         - score: fit in [0,1]\n\
         - confidence: your confidence in [0,1]\n\
         Decide NO when fit is weak or unclear. Never invent facts absent from the candidate profile.\n\n\
         == YOUR PROFILE ==\n{self_profile}\n\n\
         == MATCH CRITERIA ==\n{criteria}\n\n\
         == MESSAGE TEMPLATE ==\n{template}\n\n\
         == CANDIDATE PROFILE ==\n{profile_text}",
        self_profile = ctx.self_profile,
        criteria = ctx.criteria,
        template = ctx.template,
        profile_text = profile_text,
    )
}

/// Assemble the wire request.  `with_optional` controls whether the
/// schema/verbosity/reasoning/temperature bundle rides along.
fn build_request(
    model: &str,
    prompt: &str,
    params: &ParamBundle,
    with_optional: bool,
) -> ResponseRequest {
    let mut request = ResponseRequest::new(model, json!(prompt), params.max_output_tokens);
    if !with_optional {
        return request;
    }

    request.temperature = params.temperature;
    request.service_tier = params.service_tier.clone();
    request.text = Some(TextConfig {
        verbosity: params.verbosity.map(|v| v.as_str().to_string()),
        format: Some(verdict_format()),
    });
    request.reasoning = params
        .reasoning_effort
        .map(|effort| ReasoningConfig {
            effort: effort.as_str().to_string(),
        });
    request
}

/// Structured-output format derived from the verdict wire shape.
fn verdict_format() -> serde_json::Value {
    let schema = schemars::schema_for!(VerdictWire);
    json!({
        "type": "json_schema",
        "name": "verdict",
        "strict": true,
        "schema": serde_json::to_value(schema).unwrap_or_else(|_| json!({})),
    })
}
