use crate::client::LlmClient;
use crate::error::LlmError;

/// Decision model preference, best first, used when no model is configured.
/// Matching is by prefix so dated snapshots resolve too.
const DECISION_MODEL_PREFERENCE: &[&str] = &[
    "gpt-5-mini",
    "gpt-5",
    "gpt-4.1-mini",
    "gpt-4.1",
    "gpt-4o-mini",
    "gpt-4o",
];

/// Substring that marks a model as computer-use capable.
const CUA_MARKER: &str = "computer-use";

/// Models chosen for a run, surfaced in the `models_resolved` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModels {
    pub decision_model: String,
    pub cua_model: Option<String>,
}

/// Pick the decision and (optionally) computer-use models from the
/// provider's advertised catalog.
///
/// A configured name wins even when the catalog doesn't list it — some
/// deployments hide aliased models — but the mismatch is logged.  With no
/// configured name the first advertised preference match is used.
pub async fn resolve_models(
    client: &LlmClient,
    configured_decision: &str,
    configured_cua: &str,
    want_cua: bool,
) -> Result<ResolvedModels, LlmError> {
    let advertised = client.list_models().await?;

    let decision_model = if !configured_decision.is_empty() {
        if !advertised.iter().any(|id| id == configured_decision) {
            tracing::warn!(
                model = configured_decision,
                "configured decision model not in the advertised catalog — using it anyway"
            );
        }
        configured_decision.to_string()
    } else {
        pick_decision_model(&advertised).ok_or_else(|| LlmError::Parse(
            "provider catalog contains no usable decision model".to_string(),
        ))?
    };

    let cua_model = if !want_cua {
        None
    } else if !configured_cua.is_empty() {
        Some(configured_cua.to_string())
    } else {
        pick_cua_model(&advertised)
    };

    Ok(ResolvedModels {
        decision_model,
        cua_model,
    })
}

fn pick_decision_model(advertised: &[String]) -> Option<String> {
    for preferred in DECISION_MODEL_PREFERENCE {
        if let Some(id) = advertised.iter().find(|id| id.starts_with(preferred)) {
            return Some(id.clone());
        }
    }
    None
}

fn pick_cua_model(advertised: &[String]) -> Option<String> {
    advertised
        .iter()
        .find(|id| id.contains(CUA_MARKER))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(ids: &[&str]) -> Vec<String> {
        ids.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn preference_order_wins_over_catalog_order() {
        let advertised = catalog(&["gpt-4o", "gpt-5-mini-2026-01-01", "gpt-4.1"]);
        assert_eq!(
            pick_decision_model(&advertised).as_deref(),
            Some("gpt-5-mini-2026-01-01")
        );
    }

    #[test]
    fn no_preferred_model_yields_none() {
        let advertised = catalog(&["whisper-1", "text-embedding-3-small"]);
        assert!(pick_decision_model(&advertised).is_none());
    }

    #[test]
    fn cua_model_matched_by_marker() {
        let advertised = catalog(&["gpt-5", "computer-use-preview-2025-03-11"]);
        assert_eq!(
            pick_cua_model(&advertised).as_deref(),
            Some("computer-use-preview-2025-03-11")
        );
        assert!(pick_cua_model(&catalog(&["gpt-5"])).is_none());
    }
}
