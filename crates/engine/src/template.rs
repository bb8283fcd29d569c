use anyhow::{Result, bail};

use outreach_config::TemplateConfig;

use crate::verdict::Verdict;

/// Values substituted into the user's message template.
#[derive(Debug, Clone, Default)]
pub struct SlotValues {
    pub name: Option<String>,
    pub why_match: Option<String>,
    pub cta: Option<String>,
    pub draft: Option<String>,
}

impl SlotValues {
    /// Standard slot assignment: name from extraction, rationale and draft
    /// from the verdict.
    pub fn from_verdict(verdict: &Verdict, name: Option<&str>) -> Self {
        Self {
            name: name.map(ToString::to_string),
            why_match: (!verdict.rationale.is_empty()).then(|| verdict.rationale.clone()),
            cta: None,
            draft: (!verdict.draft.is_empty()).then(|| verdict.draft.clone()),
        }
    }
}

/// Neutral fillers for missing slot values.  A reader of the sent message
/// must never see a literal `{slot}` placeholder.
const NAME_FILLER: &str = "there";
const WHY_MATCH_FILLER: &str = "your profile really stood out";
const CTA_FILLER: &str = "Open to a quick chat?";

/// Render the outgoing message.
///
/// A template containing slots is substituted; a slot-free template defers
/// to the verdict's draft, which the model already wrote against the
/// template.  The result is length-capped and screened against banned
/// phrases; a banned rendering falls back to the verdict's original draft
/// unchanged when that draft is non-empty, otherwise the failure propagates.
pub fn render_message(
    template: &str,
    verdict: &Verdict,
    slots: &SlotValues,
    config: &TemplateConfig,
) -> Result<String> {
    let rendered = if has_slots(template) {
        substitute(template, slots)
    } else if !verdict.draft.trim().is_empty() {
        verdict.draft.clone()
    } else {
        template.to_string()
    };

    let capped = cap_chars(&rendered, config.max_chars);

    if let Some(banned) = first_banned_phrase(&capped, &config.banned_phrases) {
        tracing::warn!(phrase = %banned, "rendered message hit a banned phrase");
        if !verdict.draft.trim().is_empty() && verdict.draft != capped {
            let fallback = cap_chars(&verdict.draft, config.max_chars);
            if first_banned_phrase(&fallback, &config.banned_phrases).is_none() {
                return Ok(fallback);
            }
        }
        bail!("rendered message contains banned phrase: {banned}");
    }

    if capped.trim().is_empty() {
        bail!("rendered message is empty");
    }

    Ok(capped)
}

fn has_slots(template: &str) -> bool {
    ["{name}", "{why_match}", "{cta}", "{draft}"]
        .iter()
        .any(|slot| template.contains(slot))
}

fn substitute(template: &str, slots: &SlotValues) -> String {
    template
        .replace("{name}", slots.name.as_deref().unwrap_or(NAME_FILLER))
        .replace(
            "{why_match}",
            slots.why_match.as_deref().unwrap_or(WHY_MATCH_FILLER),
        )
        .replace("{cta}", slots.cta.as_deref().unwrap_or(CTA_FILLER))
        .replace("{draft}", slots.draft.as_deref().unwrap_or(""))
}

fn cap_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

fn first_banned_phrase<'a>(message: &str, banned: &'a [String]) -> Option<&'a str> {
    let lowered = message.to_lowercase();
    banned
        .iter()
        .find(|phrase| !phrase.is_empty() && lowered.contains(&phrase.to_lowercase()))
        .map(String::as_str)
}
