use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Maximum rationale length kept in verdicts and events.
pub const MAX_RATIONALE_CHARS: usize = 280;

/// Raw-text excerpt preserved when parsing fails.
pub const RAW_EXCERPT_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Yes,
    No,
    /// Upstream failure — not a negative judgment.
    Error,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Yes => "YES",
            Decision::No => "NO",
            Decision::Error => "ERROR",
        }
    }
}

/// Structured outcome of one fit evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub decision: Decision,
    pub rationale: String,
    pub draft: String,
    pub score: f32,
    pub confidence: f32,
    /// Whether the provider's reply parsed as valid verdict JSON.
    pub json_ok: bool,
}

impl Verdict {
    pub fn error(rationale: impl Into<String>) -> Self {
        Self {
            decision: Decision::Error,
            rationale: truncate_chars(&rationale.into(), MAX_RATIONALE_CHARS),
            draft: String::new(),
            score: 0.0,
            confidence: 0.0,
            json_ok: false,
        }
    }

    /// Enforce the invariants no parser step can: a YES with nothing to send
    /// is an upstream failure, never a sendable verdict.
    pub fn validated(mut self) -> Self {
        if self.decision == Decision::Yes && self.draft.trim().is_empty() {
            self.decision = Decision::Error;
            self.rationale = truncate_chars(
                &format!("YES verdict with empty draft: {}", self.rationale),
                MAX_RATIONALE_CHARS,
            );
        }
        self
    }
}

/// Shape the model is asked to produce, also the source of the JSON schema
/// sent as the structured-output format.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct VerdictWire {
    pub decision: String,
    pub rationale: String,
    pub draft: String,
    pub score: f64,
    pub confidence: f64,
}

/// Parse a provider reply into a [`Verdict`].
///
/// Accepts a fenced ```json block or a bare object (models wrap JSON in
/// prose more often than they should).  Any failure yields
/// `(Verdict::error, raw excerpt)` so the caller can log what actually came
/// back.
pub fn parse_verdict(raw: &str) -> Result<Verdict, String> {
    let Some(wire) = extract_json::<VerdictWire>(raw) else {
        return Err(truncate_chars(raw, RAW_EXCERPT_CHARS));
    };

    let decision = match wire.decision.trim().to_uppercase().as_str() {
        "YES" => Decision::Yes,
        "NO" => Decision::No,
        "ERROR" => Decision::Error,
        _ => return Err(truncate_chars(raw, RAW_EXCERPT_CHARS)),
    };

    Ok(Verdict {
        decision,
        rationale: truncate_chars(&wire.rationale, MAX_RATIONALE_CHARS),
        draft: wire.draft,
        score: (wire.score as f32).clamp(0.0, 1.0),
        confidence: (wire.confidence as f32).clamp(0.0, 1.0),
        json_ok: true,
    }
    .validated())
}

/// Extract the first valid JSON object from a model reply: fenced
/// ```json blocks take precedence, then a bare first-`{` to last-`}` span.
fn extract_json<T: serde::de::DeserializeOwned>(response: &str) -> Option<T> {
    if let Some(fence_start) = response.find("```json") {
        let after_fence = &response[fence_start + "```json".len()..];
        if let Some(json_start) = after_fence.find(|c: char| !c.is_whitespace()) {
            let json_body = &after_fence[json_start..];
            if let Some(fence_end) = json_body.find("```") {
                let json_str = json_body[..fence_end].trim();
                if let Ok(val) = serde_json::from_str(json_str) {
                    return Some(val);
                }
            }
        }
    }

    let trimmed = response.trim();
    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            if end > start {
                if let Ok(val) = serde_json::from_str(&trimmed[start..=end]) {
                    return Some(val);
                }
            }
        }
    }

    None
}

pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{"decision":"YES","rationale":"Strong ML/NYC match","draft":"Hi Alice — saw Python & ML; let's chat.","score":0.82,"confidence":0.78}"#;

    #[test]
    fn parses_bare_json() {
        let verdict = parse_verdict(VALID).unwrap();
        assert_eq!(verdict.decision, Decision::Yes);
        assert_eq!(verdict.rationale, "Strong ML/NYC match");
        assert!(verdict.json_ok);
        assert!((verdict.score - 0.82).abs() < 1e-6);
    }

    #[test]
    fn parses_fenced_json_with_prose() {
        let raw = format!("Here is my assessment:\n```json\n{VALID}\n```\nHope it helps!");
        let verdict = parse_verdict(&raw).unwrap();
        assert_eq!(verdict.decision, Decision::Yes);
    }

    #[test]
    fn clamps_out_of_range_scores() {
        let raw = r#"{"decision":"NO","rationale":"weak","draft":"","score":1.7,"confidence":-0.2}"#;
        let verdict = parse_verdict(raw).unwrap();
        assert_eq!(verdict.score, 1.0);
        assert_eq!(verdict.confidence, 0.0);
    }

    #[test]
    fn lowercase_decision_is_accepted() {
        let raw = r#"{"decision":"no","rationale":"","draft":"","score":0,"confidence":0}"#;
        assert_eq!(parse_verdict(raw).unwrap().decision, Decision::No);
    }

    #[test]
    fn unknown_decision_is_a_parse_failure() {
        let raw = r#"{"decision":"MAYBE","rationale":"","draft":"","score":0,"confidence":0}"#;
        assert!(parse_verdict(raw).is_err());
    }

    #[test]
    fn plain_text_fails_with_truncated_excerpt() {
        let raw = "Sorry, I cannot help with that. ".repeat(20);
        let excerpt = parse_verdict(&raw).unwrap_err();
        assert_eq!(excerpt.chars().count(), RAW_EXCERPT_CHARS);
    }

    #[test]
    fn missing_keys_fail() {
        let raw = r#"{"decision":"YES","rationale":"fit"}"#;
        assert!(parse_verdict(raw).is_err());
    }

    #[test]
    fn yes_with_empty_draft_becomes_error() {
        let raw = r#"{"decision":"YES","rationale":"fit","draft":"  ","score":0.9,"confidence":0.9}"#;
        let verdict = parse_verdict(raw).unwrap();
        assert_eq!(verdict.decision, Decision::Error);
        // json_ok stays true — the reply parsed; the content was unusable.
        assert!(verdict.json_ok);
    }

    #[test]
    fn long_rationale_is_capped_at_280() {
        let long = "x".repeat(500);
        let raw = format!(
            r#"{{"decision":"NO","rationale":"{long}","draft":"","score":0.1,"confidence":0.5}}"#
        );
        let verdict = parse_verdict(&raw).unwrap();
        assert_eq!(verdict.rationale.chars().count(), MAX_RATIONALE_CHARS);
    }

    #[test]
    fn wire_schema_has_exactly_the_verdict_keys() {
        let schema = serde_json::to_value(schemars::schema_for!(VerdictWire)).unwrap();
        let props = schema["properties"].as_object().unwrap();
        let mut keys: Vec<_> = props.keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, ["confidence", "decision", "draft", "rationale", "score"]);
    }
}
